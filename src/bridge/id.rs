//! JSON-RPC `id` extraction for synthesized error replies.
//!
//! This is a bounded byte scanner, not a JSON parser. It looks for the first
//! `"id"` key that is followed by a colon and classifies the value by its
//! first character. Anything it cannot classify is reported as `null`.

use std::fmt;

/// Default cap on the raw id text, quotes included.
pub const DEFAULT_MAX_ID_LEN: usize = 256;

const ID_KEY: &[u8] = b"\"id\"";

/// The raw text of a request id, ready to be spliced into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdToken {
    #[default]
    Null,
    /// Raw number text, e.g. `42` or `-1.5e3`.
    Number(String),
    /// Raw string text including the surrounding quotes, escapes untouched.
    String(String),
}

impl IdToken {
    /// The token as JSON text.
    pub fn as_json(&self) -> &str {
        match self {
            IdToken::Null => "null",
            IdToken::Number(raw) | IdToken::String(raw) => raw,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IdToken::Null)
    }
}

impl fmt::Display for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_json())
    }
}

/// Extract the request id using [`DEFAULT_MAX_ID_LEN`].
pub fn extract_id(body: &[u8]) -> IdToken {
    extract_id_with_cap(body, DEFAULT_MAX_ID_LEN)
}

/// Extract the request id, truncating its raw text to at most `cap` bytes.
pub fn extract_id_with_cap(body: &[u8], cap: usize) -> IdToken {
    let mut pos = 0;

    while let Some(found) = find(&body[pos..], ID_KEY) {
        pos += found + ID_KEY.len();
        pos = skip_whitespace(body, pos);

        // `"id"` used as a value rather than a key; keep looking.
        if body.get(pos) != Some(&b':') {
            continue;
        }
        pos = skip_whitespace(body, pos + 1);

        return match body.get(pos) {
            Some(b'"') => scan_string(body, pos, cap),
            Some(b) if *b == b'-' || b.is_ascii_digit() => scan_number(body, pos, cap),
            _ => IdToken::Null,
        };
    }

    IdToken::Null
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn skip_whitespace(body: &[u8], mut pos: usize) -> usize {
    while matches!(body.get(pos), Some(b' ' | b'\t' | b'\n' | b'\r')) {
        pos += 1;
    }
    pos
}

fn scan_string(body: &[u8], start: usize, cap: usize) -> IdToken {
    let mut pos = start + 1;
    while pos < body.len() && body[pos] != b'"' {
        if body[pos] == b'\\' && pos + 1 < body.len() {
            pos += 1;
        }
        pos += 1;
    }
    if pos >= body.len() {
        // Unterminated string.
        return IdToken::Null;
    }

    let raw = &body[start..=pos];
    if raw.len() <= cap {
        return match std::str::from_utf8(raw) {
            Ok(text) => IdToken::String(text.to_owned()),
            Err(_) => IdToken::Null,
        };
    }

    // Keep room for the closing quote.
    if cap < 2 {
        return IdToken::Null;
    }
    let mut kept = &raw[..cap - 1];
    while std::str::from_utf8(kept).is_err() && kept.len() > 1 {
        kept = &kept[..kept.len() - 1];
    }
    let trailing_backslashes = kept.iter().rev().take_while(|b| **b == b'\\').count();
    if trailing_backslashes % 2 == 1 {
        kept = &kept[..kept.len() - 1];
    }
    match std::str::from_utf8(kept) {
        Ok(text) => IdToken::String(format!("{text}\"")),
        Err(_) => IdToken::Null,
    }
}

fn scan_number(body: &[u8], start: usize, cap: usize) -> IdToken {
    let len = body[start..]
        .iter()
        .take_while(|b| matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E'))
        .count();
    let raw = &body[start..start + len.min(cap)];
    // The accepted byte set is pure ASCII.
    IdToken::Number(String::from_utf8_lossy(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_numeric_id() {
        let body = br#"{"jsonrpc":"2.0","method":"ping","id":1}"#;
        assert_eq!(extract_id(body), IdToken::Number("1".into()));
    }

    #[test]
    fn finds_string_id_with_quotes() {
        let body = br#"{"id" : "abc-1","method":"ping"}"#;
        assert_eq!(extract_id(body), IdToken::String("\"abc-1\"".into()));
    }

    #[test]
    fn keeps_escaped_quotes_in_string_id() {
        let body = br#"{"id":"a\"b","method":"x"}"#;
        assert_eq!(extract_id(body).as_json(), r#""a\"b""#);
    }

    #[test]
    fn explicit_null_and_missing_id() {
        assert_eq!(extract_id(br#"{"id":null}"#), IdToken::Null);
        assert_eq!(extract_id(br#"{"method":"ping"}"#), IdToken::Null);
        assert_eq!(extract_id(b""), IdToken::Null);
    }

    #[test]
    fn skips_id_used_as_a_value() {
        let body = br#"{"method":"id","id":-7.5e2}"#;
        assert_eq!(extract_id(body), IdToken::Number("-7.5e2".into()));
    }

    #[test]
    fn unsupported_or_truncated_values_are_null() {
        assert_eq!(extract_id(br#"{"id":true}"#), IdToken::Null);
        assert_eq!(extract_id(br#"{"id":{"x":1}}"#), IdToken::Null);
        assert_eq!(extract_id(br#"{"id":"never closed"#), IdToken::Null);
        assert_eq!(extract_id(br#"{"id":"#), IdToken::Null);
        assert_eq!(extract_id(br#"{"id"   "#), IdToken::Null);
    }

    #[test]
    fn never_reads_past_the_slice() {
        let full = br#"{"id":12345}"#;
        // Cut in the middle of the number: only the visible digits count.
        assert_eq!(extract_id(&full[..8]), IdToken::Number("12".into()));
    }

    #[test]
    fn long_number_is_capped() {
        let digits = "9".repeat(400);
        let body = format!(r#"{{"id":{digits}}}"#);
        let id = extract_id(body.as_bytes());
        assert_eq!(id.as_json().len(), DEFAULT_MAX_ID_LEN);
    }

    #[test]
    fn long_string_is_capped_and_closed() {
        let text = "x".repeat(400);
        let body = format!(r#"{{"id":"{text}"}}"#);
        let id = extract_id_with_cap(body.as_bytes(), 16);
        assert_eq!(id.as_json(), format!("\"{}\"", "x".repeat(14)));
    }

    #[test]
    fn capped_string_does_not_end_inside_an_escape() {
        let body = br#"{"id":"abcdef\\\"ghijkl"}"#;
        let id = extract_id_with_cap(body, 9);
        assert_eq!(id.as_json(), "\"abcdef\"");
    }
}
