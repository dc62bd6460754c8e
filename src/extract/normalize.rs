//! Text normalization shared by every extraction strategy.

/// Normalize raw tool output into stored text.
///
/// Strips NUL and other control characters, collapses CRLF/CR and form
/// feeds into plain `\n`, and trims surrounding whitespace. Tabs survive:
/// the layout-preserving text extractor uses them for column alignment.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\x0c' => out.push('\n'),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Whether text has at least one non-whitespace character.
pub fn is_meaningful(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// Count of non-whitespace characters.
pub fn content_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
