//! Body preparation for outgoing items
//!
//! Selects the body type against a strategy preference order, applies
//! truncation with pre-truncation size accounting, derives plain text from
//! HTML when a stored item has no text part, and produces the short
//! AirSyncBase Preview snippet.

use regex::Regex;
use std::sync::OnceLock;

use crate::common::types::BodyType;

/// Maximum Preview length in characters
pub const PREVIEW_MAX_CHARS: usize = 255;

/// Prepared payload for one AirSyncBase Body element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// A body ready for projection
#[derive(Debug, Clone)]
pub struct PreparedBody {
    pub body_type: BodyType,
    pub payload: Payload,
    /// Size in bytes before truncation
    pub estimated_size: usize,
    pub truncated: bool,
}

/// Pick the body type: first entry of the strategy order the client also
/// asked for, falling back to the strategy's first choice when the client
/// sent no preference.
pub fn select_body_type(client_prefs: &[BodyType], strategy_order: &[BodyType]) -> BodyType {
    if client_prefs.is_empty() {
        return strategy_order[0];
    }
    strategy_order
        .iter()
        .copied()
        .find(|candidate| client_prefs.contains(candidate))
        .unwrap_or(strategy_order[0])
}

/// Truncate text at a UTF-8 boundary, reporting the pre-truncation byte size
pub fn prepare_text(raw: &str, limit: Option<usize>) -> PreparedBody {
    let estimated_size = raw.len();
    let (text, truncated) = match limit {
        Some(limit) if raw.len() > limit => (truncate_at_boundary(raw, limit), true),
        _ => (raw.to_string(), false),
    };
    PreparedBody {
        body_type: BodyType::Plain,
        payload: Payload::Text(text),
        estimated_size,
        truncated,
    }
}

/// Truncate binary data, reporting the pre-truncation size
pub fn prepare_binary(raw: &[u8], limit: Option<usize>) -> PreparedBody {
    let estimated_size = raw.len();
    let (data, truncated) = match limit {
        Some(limit) if raw.len() > limit => (raw[..limit].to_vec(), true),
        _ => (raw.to_vec(), false),
    };
    PreparedBody {
        body_type: BodyType::Mime,
        payload: Payload::Binary(data),
        estimated_size,
        truncated,
    }
}

fn truncate_at_boundary(raw: &str, limit: usize) -> String {
    let mut end = limit;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>|<[^>]*>").expect("valid pattern")
    })
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("valid pattern"))
}

/// Derive plain text from an HTML body: drop script/style subtrees, strip
/// tags, decode entities, collapse whitespace.
pub fn plain_from_html(html: &str) -> String {
    let stripped = tag_pattern().replace_all(html, " ");
    let decoded = html_escape::decode_html_entities(stripped.as_ref()).into_owned();
    whitespace_pattern()
        .replace_all(decoded.trim(), " ")
        .into_owned()
}

/// Short plaintext snippet for `<AirSyncBase:Preview>`
pub fn preview(body_plain: Option<&str>, body_html: Option<&str>) -> Option<String> {
    let text = match (body_plain, body_html) {
        (Some(plain), _) if !plain.trim().is_empty() => {
            whitespace_pattern().replace_all(plain.trim(), " ").into_owned()
        }
        (_, Some(html)) => plain_from_html(html),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(PREVIEW_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_body_type_intersection() {
        let outlook_order = [BodyType::Html, BodyType::Plain, BodyType::Mime];
        assert_eq!(
            select_body_type(&[BodyType::Plain, BodyType::Html], &outlook_order),
            BodyType::Html
        );
        assert_eq!(
            select_body_type(&[BodyType::Plain], &outlook_order),
            BodyType::Plain
        );
    }

    #[test]
    fn test_select_body_type_no_client_preference() {
        let ios_order = [BodyType::Plain, BodyType::Html, BodyType::Mime];
        assert_eq!(select_body_type(&[], &ios_order), BodyType::Plain);
    }

    #[test]
    fn test_select_body_type_disjoint_falls_back() {
        let order = [BodyType::Html, BodyType::Plain, BodyType::Mime];
        assert_eq!(select_body_type(&[BodyType::Mime], &order), BodyType::Mime);
    }

    #[test]
    fn test_prepare_text_reports_pre_truncation_size() {
        let body = prepare_text("abcdefgh", Some(4));
        assert_eq!(body.payload, Payload::Text("abcd".to_string()));
        assert_eq!(body.estimated_size, 8);
        assert!(body.truncated);
    }

    #[test]
    fn test_prepare_text_no_limit() {
        let body = prepare_text("abc", None);
        assert_eq!(body.estimated_size, 3);
        assert!(!body.truncated);
    }

    #[test]
    fn test_truncation_respects_utf8_boundaries() {
        // 'é' is two bytes; a limit in the middle must not split it
        let body = prepare_text("caféteria", Some(4));
        assert_eq!(body.payload, Payload::Text("caf".to_string()));
        assert!(body.truncated);
    }

    #[test]
    fn test_prepare_binary_truncates() {
        let body = prepare_binary(&[1, 2, 3, 4, 5], Some(2));
        assert_eq!(body.payload, Payload::Binary(vec![1, 2]));
        assert_eq!(body.estimated_size, 5);
        assert!(body.truncated);
    }

    #[test]
    fn test_plain_from_html() {
        let html = "<html><style>p{}</style><body><p>Hello &amp; welcome</p>\n<p>back</p></body></html>";
        assert_eq!(plain_from_html(html), "Hello & welcome back");
    }

    #[test]
    fn test_preview_prefers_plain() {
        let snippet = preview(Some("  first   line  "), Some("<p>ignored</p>")).unwrap();
        assert_eq!(snippet, "first line");
    }

    #[test]
    fn test_preview_caps_length() {
        let long = "x".repeat(1000);
        let snippet = preview(Some(&long), None).unwrap();
        assert_eq!(snippet.chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn test_preview_empty_bodies() {
        assert_eq!(preview(None, None), None);
        assert_eq!(preview(Some("   "), None), None);
    }
}
