//! Tabular page artifact assembly.
//!
//! One CSV per document: a header row plus one row per stored page, in
//! page-number order. The artifact is what gets uploaded to object
//! storage; the same rows are persisted to the page store.

use std::io::Write;

use crate::extract::PageText;
use crate::models::CatalogItem;

/// Fixed artifact column order.
const HEADER: &str = "name,identity,source_url,page_number,text";

/// Render the page rows for one document into a CSV artifact.
///
/// `pages` must already be in ascending page order; the extraction engine
/// guarantees that independent of extraction completion order.
pub fn build_page_artifact(item: &CatalogItem, pages: &[PageText]) -> Vec<u8> {
    let mut out = Vec::new();
    writeln!(out, "{HEADER}").ok();

    for page in pages {
        writeln!(
            out,
            "{},{},{},{},{}",
            escape_csv(&item.name),
            escape_csv(&item.identity),
            escape_csv(&item.binary_url),
            page.page_number,
            escape_csv(&page.text)
        )
        .ok();
    }

    out
}

/// Quote-wrap a field containing a comma, double quote, or newline;
/// internal double quotes are doubled.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageStrategy;

    fn item() -> CatalogItem {
        CatalogItem {
            id: 7,
            identity: "A".to_string(),
            name: "Sample Book".to_string(),
            binary_url: "http://x/a.pdf".to_string(),
            file_size: None,
            collection: None,
            subcollection: None,
        }
    }

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page_number: n,
            text: text.to_string(),
            chars: text.chars().filter(|c| !c.is_whitespace()).count(),
            strategy: PageStrategy::TextLayer,
        }
    }

    /// Minimal RFC 4180 parser for round-trip checks.
    fn parse_csv(input: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if quoted {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => quoted = false,
                    c => field.push(c),
                }
            } else {
                match c {
                    '"' => quoted = true,
                    ',' => row.push(std::mem::take(&mut field)),
                    '\n' => {
                        row.push(std::mem::take(&mut field));
                        rows.push(std::mem::take(&mut row));
                    }
                    c => field.push(c),
                }
            }
        }
        if !field.is_empty() || !row.is_empty() {
            row.push(field);
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_escape_csv_plain_field_untouched() {
        assert_eq!(escape_csv("hello"), "hello");
    }

    #[test]
    fn test_escape_csv_round_trip() {
        for original in [
            "with, comma",
            "with \"quotes\"",
            "line\nbreak",
            "all, of \"it\"\ntogether",
        ] {
            let parsed = parse_csv(&format!("{}\n", escape_csv(original)));
            assert_eq!(parsed[0][0], original, "round trip failed for {original:?}");
        }
    }

    #[test]
    fn test_artifact_header_and_row_order() {
        let pages = vec![page(1, "Hello world"), page(2, "Page Two")];
        let artifact = build_page_artifact(&item(), &pages);
        let text = String::from_utf8(artifact).unwrap();

        let rows = parse_csv(&text);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["name", "identity", "source_url", "page_number", "text"]);
        assert_eq!(
            rows[1],
            vec!["Sample Book", "A", "http://x/a.pdf", "1", "Hello world"]
        );
        assert_eq!(
            rows[2],
            vec!["Sample Book", "A", "http://x/a.pdf", "2", "Page Two"]
        );
    }

    #[test]
    fn test_artifact_escapes_page_text() {
        let pages = vec![page(1, "a,b \"c\"\nd")];
        let artifact = build_page_artifact(&item(), &pages);
        let text = String::from_utf8(artifact).unwrap();

        let rows = parse_csv(&text);
        assert_eq!(rows[1][4], "a,b \"c\"\nd");
    }
}
