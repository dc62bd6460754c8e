//! Scoped temp resources for one document's processing.
//!
//! Every downloaded binary and rendered page image lives inside a
//! per-document scratch directory. The directory is removed when the
//! handle drops, which covers success, recorded failures, and panics
//! alike; page images are additionally released as soon as their page's
//! extraction completes so peak disk usage stays bounded under page-level
//! concurrency.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;

/// Longest sanitized identity fragment used in scratch names.
const IDENTITY_NAME_LIMIT: usize = 48;

/// Scratch directory for a single document.
pub struct ScratchDir {
    dir: TempDir,
    binary_path: PathBuf,
}

impl ScratchDir {
    /// Allocate a scratch directory under `base`.
    ///
    /// The directory name combines the sanitized identity, a timestamp,
    /// and a random suffix, so concurrent workers and repeated runs never
    /// collide.
    pub fn create(base: &Path, identity: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(base)?;
        let prefix = format!(
            "{}-{}-",
            sanitize_identity(identity),
            Utc::now().format("%Y%m%d%H%M%S")
        );
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(base)?;
        let binary_path = dir.path().join("source.pdf");
        Ok(Self { dir, binary_path })
    }

    /// Where the downloaded source binary is written.
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Output prefix handed to the rasterizer for one page.
    ///
    /// Unique per page so concurrent page workers writing into the same
    /// directory cannot clobber each other's images.
    pub fn page_image_prefix(&self, page: u32) -> PathBuf {
        self.dir.path().join(format!("page-{page}"))
    }

    /// Delete a page's rendered image once its extraction completes.
    pub fn release_page_image(&self, image: &Path) {
        if let Err(e) = std::fs::remove_file(image) {
            tracing::debug!("could not remove page image {}: {}", image.display(), e);
        }
    }

    /// The scratch directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Reduce an identity key to a filesystem-safe fragment.
pub fn sanitize_identity(identity: &str) -> String {
    let mut cleaned: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.truncate(IDENTITY_NAME_LIMIT);
    if cleaned.is_empty() {
        cleaned.push_str("item");
    }
    cleaned
}
