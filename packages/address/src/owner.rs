//! Owner label cleaning.
//!
//! Ownership exports frequently carry list-literal wrappers such as
//! `['Acme Holdings', 'Acme Ltd']` or `('Acme',)`. These are unwrapped with
//! a small explicit grammar; nothing is ever evaluated.

use crate::UNKNOWN;

/// Cleans a free-form owner label.
///
/// - Blank input becomes `(Unknown)`.
/// - A bracketed list of quoted strings or numbers becomes the items joined
///   by `", "`.
/// - One pair of surrounding quotes is stripped.
/// - A bracketed single value without commas is unwrapped.
#[must_use]
pub fn clean_owner_label(raw: Option<&str>) -> String {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return UNKNOWN.to_string();
    };

    if let Some(items) = parse_list_literal(s) {
        let cleaned: Vec<&str> = items
            .iter()
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"'))
            .filter(|item| !item.is_empty())
            .collect();
        return if cleaned.is_empty() {
            UNKNOWN.to_string()
        } else {
            cleaned.join(", ")
        };
    }

    let mut s = s;
    if s.len() >= 2 && s.starts_with(['\'', '"']) && s.ends_with(['\'', '"']) {
        s = &s[1..s.len() - 1];
    }

    let mut stripped = s.trim();
    if stripped.starts_with('[') && stripped.ends_with(']') && !stripped.contains(',') {
        stripped = stripped[1..stripped.len() - 1].trim();
    }

    if stripped.is_empty() {
        UNKNOWN.to_string()
    } else {
        stripped.to_string()
    }
}

/// Derives a URL/attribute-safe key from an owner label.
///
/// Lowercases and replaces every run of characters outside `[a-z0-9]` with
/// a single `-`. Blank or fully-stripped input becomes `unknown`.
#[must_use]
pub fn sanitize_owner(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let mut key = String::with_capacity(lower.len());
    let mut pending_dash = false;

    for c in lower.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !key.is_empty() {
                key.push('-');
            }
            pending_dash = false;
            key.push(c);
        } else {
            pending_dash = true;
        }
    }

    if key.is_empty() {
        "unknown".to_string()
    } else {
        key
    }
}

/// Parses `[...]` / `(...)` wrapping only quoted strings or numbers.
///
/// Returns `None` when the text is not such a literal, in which case the
/// caller falls back to plain-string cleaning. A parenthesized value with
/// no comma is a grouping rather than a tuple, and yields its single item
/// only when that item is quoted.
fn parse_list_literal(s: &str) -> Option<Vec<String>> {
    let inner = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')))?;
    let is_tuple = s.starts_with('(');

    let tokens = split_outside_quotes(inner)?;
    let mut items = Vec::new();
    for token in &tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(unquoted) = unquote(token) {
            items.push(unquoted.to_string());
        } else if token.parse::<f64>().is_ok() && !(is_tuple && tokens.len() == 1) {
            items.push(token.to_string());
        } else {
            return None;
        }
    }

    Some(items)
}

/// Splits on commas that are not inside quotes. Returns `None` if a quote
/// is left unterminated.
fn split_outside_quotes(s: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, ',') => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return None;
    }
    parts.push(&s[start..]);
    Some(parts)
}

/// Returns the contents of a token wrapped in matching quotes.
fn unquote(token: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        token
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
            .filter(|_| token.len() >= 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_owner_is_unknown() {
        assert_eq!(clean_owner_label(None), "(Unknown)");
        assert_eq!(clean_owner_label(Some("   ")), "(Unknown)");
    }

    #[test]
    fn unknown_sentinel_is_stable() {
        assert_eq!(clean_owner_label(Some("(Unknown)")), "(Unknown)");
    }

    #[test]
    fn unwraps_quoted_lists() {
        assert_eq!(
            clean_owner_label(Some("['Acme Holdings', 'Acme Ltd']")),
            "Acme Holdings, Acme Ltd"
        );
        assert_eq!(clean_owner_label(Some("('Acme',)")), "Acme");
        assert_eq!(clean_owner_label(Some("[\"Smith, Jones & Co\"]")), "Smith, Jones & Co");
    }

    #[test]
    fn empty_list_is_unknown() {
        assert_eq!(clean_owner_label(Some("[]")), "(Unknown)");
        assert_eq!(clean_owner_label(Some("['']")), "(Unknown)");
    }

    #[test]
    fn strips_surrounding_quotes() {
        assert_eq!(clean_owner_label(Some("'Acme'")), "Acme");
        assert_eq!(clean_owner_label(Some("\"Acme\"")), "Acme");
    }

    #[test]
    fn unwraps_bare_bracketed_value() {
        assert_eq!(clean_owner_label(Some("[Acme]")), "Acme");
        assert_eq!(clean_owner_label(Some("[Acme, Beta]")), "[Acme, Beta]");
    }

    #[test]
    fn passes_plain_labels_through() {
        assert_eq!(clean_owner_label(Some(" Acme Holdings ")), "Acme Holdings");
        assert_eq!(clean_owner_label(Some("(Acme)")), "(Acme)");
    }

    #[test]
    fn cleaning_is_stable() {
        for raw in ["['A', 'B']", "'A'", "[A]", "Plain", "(Unknown)"] {
            let once = clean_owner_label(Some(raw));
            assert_eq!(clean_owner_label(Some(&once)), once, "input: {raw:?}");
        }
    }

    #[test]
    fn sanitizes_owner_keys() {
        assert_eq!(sanitize_owner("Acme Holdings Ltd."), "acme-holdings-ltd");
        assert_eq!(sanitize_owner("  --Smith & Jones--  "), "smith-jones");
        assert_eq!(sanitize_owner("(Unknown)"), "unknown");
        assert_eq!(sanitize_owner(""), "unknown");
        assert_eq!(sanitize_owner("!!!"), "unknown");
    }
}
