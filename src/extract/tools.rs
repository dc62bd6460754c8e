//! External toolchain invocations: pdfinfo, pdftotext, pdftoppm, tesseract.
//!
//! Every tool runs as a blocking subprocess. A non-zero exit or output the
//! caller cannot parse is a hard error for that step, carrying a truncated
//! capture of the tool's stderr/stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

/// Maximum bytes of tool output carried inside an error message.
const OUTPUT_CAPTURE_LIMIT: usize = 400;

/// Errors from external tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("external tool not found: {0}")]
    NotFound(String),

    #[error("{tool} failed: {detail}")]
    Invocation { tool: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Truncate captured tool output for inclusion in an error message.
fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= OUTPUT_CAPTURE_LIMIT {
        return text.to_string();
    }
    let mut cut = OUTPUT_CAPTURE_LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

fn invocation_error(tool: &'static str, output: &Output) -> ToolError {
    let mut detail = truncate_output(&output.stderr);
    if detail.is_empty() {
        detail = truncate_output(&output.stdout);
    }
    if detail.is_empty() {
        detail = format!("exited with {}", output.status);
    }
    ToolError::Invocation { tool, detail }
}

/// Run a command, returning stdout on success.
fn run_for_stdout(mut cmd: Command, tool: &'static str, hint: &str) -> Result<String, ToolError> {
    match cmd.output() {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => Err(invocation_error(tool, &output)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::NotFound(format!("{tool} ({hint})")))
        }
        Err(e) => Err(ToolError::Io(e)),
    }
}

/// Run a command for its side effects only.
fn run_for_status(mut cmd: Command, tool: &'static str, hint: &str) -> Result<(), ToolError> {
    match cmd.output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(invocation_error(tool, &output)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::NotFound(format!("{tool} ({hint})")))
        }
        Err(e) => Err(ToolError::Io(e)),
    }
}

/// Probe the page count of a PDF via pdfinfo.
pub fn page_count(pdf: &Path) -> Result<u32, ToolError> {
    let mut cmd = Command::new("pdfinfo");
    cmd.arg(pdf);
    let stdout = run_for_stdout(cmd, "pdfinfo", "install poppler-utils")?;

    for line in stdout.lines() {
        if line.starts_with("Pages:") {
            if let Some(count) = line.split_whitespace().nth(1).and_then(|s| s.parse().ok()) {
                return Ok(count);
            }
        }
    }
    Err(ToolError::Invocation {
        tool: "pdfinfo",
        detail: format!("page count missing from output: {}", truncate_output(stdout.as_bytes())),
    })
}

/// Extract the native text layer of a single page via pdftotext.
pub fn page_text_layer(pdf: &Path, page: u32) -> Result<String, ToolError> {
    let page_str = page.to_string();
    let mut cmd = Command::new("pdftotext");
    cmd.args(["-layout", "-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
        .arg(pdf)
        .arg("-");
    run_for_stdout(cmd, "pdftotext", "install poppler-utils")
}

/// Rasterize a single page to a PNG at the given DPI via pdftoppm.
///
/// Returns the path of the generated image. `output_prefix` must be unique
/// per page; pdftoppm appends a zero-padded page number and extension.
pub fn rasterize_page(
    pdf: &Path,
    page: u32,
    dpi: u32,
    output_prefix: &Path,
) -> Result<PathBuf, ToolError> {
    let page_str = page.to_string();
    let mut cmd = Command::new("pdftoppm");
    cmd.args(["-png", "-r", &dpi.to_string(), "-f", &page_str, "-l", &page_str])
        .arg(pdf)
        .arg(output_prefix);
    run_for_status(cmd, "pdftoppm", "install poppler-utils")?;

    find_rendered_image(output_prefix).ok_or_else(|| ToolError::Invocation {
        tool: "pdftoppm",
        detail: format!("no image produced for page {page}"),
    })
}

/// Locate the image pdftoppm generated for `output_prefix`.
///
/// The zero padding of the appended page number depends on the document's
/// total page count, so the name is found by prefix scan rather than
/// reconstructed. The separator after the stem is required: prefix
/// `page-3` must not match `page-30-30.png`.
fn find_rendered_image(output_prefix: &Path) -> Option<PathBuf> {
    let dir = output_prefix.parent()?;
    let stem = output_prefix.file_name()?.to_str()?;

    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let Some(rest) = name.strip_prefix(stem) else {
            continue;
        };
        if rest.starts_with('-') && rest.ends_with(".png") {
            return Some(path);
        }
    }
    None
}

/// Run tesseract OCR on an image with the given language set and
/// page-segmentation mode.
pub fn ocr_image(image: &Path, langs: &str, psm: u8) -> Result<String, ToolError> {
    let mut cmd = Command::new("tesseract");
    cmd.arg(image)
        .arg("stdout")
        .args(["-l", langs, "--oem", "1", "--psm"])
        .arg(psm.to_string());
    run_for_stdout(cmd, "tesseract", "install tesseract-ocr")
}

/// Check which required tools are present on PATH.
pub fn check_tools() -> Vec<(&'static str, bool)> {
    ["pdfinfo", "pdftotext", "pdftoppm", "tesseract"]
        .iter()
        .map(|tool| (*tool, which::which(tool).is_ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_short_input_unchanged() {
        assert_eq!(truncate_output(b"  error: boom \n"), "error: boom");
    }

    #[test]
    fn test_truncate_output_caps_long_input() {
        let long = "x".repeat(2000);
        let truncated = truncate_output(long.as_bytes());
        assert!(truncated.len() <= OUTPUT_CAPTURE_LIMIT + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let long = "é".repeat(OUTPUT_CAPTURE_LIMIT);
        let truncated = truncate_output(long.as_bytes());
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_find_rendered_image_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page-3-03.png"), b"png").unwrap();
        std::fs::write(dir.path().join("page-30-30.png"), b"png").unwrap();

        let found = find_rendered_image(&dir.path().join("page-3")).unwrap();
        assert_eq!(found, dir.path().join("page-3-03.png"));
        assert!(find_rendered_image(&dir.path().join("page-4")).is_none());
    }

    #[test]
    fn test_check_tools_reports_all_four() {
        let tools = check_tools();
        assert_eq!(tools.len(), 4);
    }
}
