//! Address key normalization.
//!
//! Provides a deterministic normalization applied symmetrically to the
//! building, address, and membership tables. This ensures that
//! "123 Main Street" and "123  MAIN ST." produce the same key.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Maps spelled-out street types to their canonical short form.
static STREET_TYPES: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        ("street", "st"),
        ("avenue", "ave"),
        ("av", "ave"),
        ("road", "rd"),
        ("drive", "dr"),
        ("boulevard", "blvd"),
        ("place", "pl"),
        ("court", "ct"),
        ("highway", "hwy"),
    ])
});

/// Whole-word match for any key of [`STREET_TYPES`].
static STREET_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(street|avenue|av|road|drive|boulevard|place|court|highway)\b")
        .expect("valid regex")
});

/// Regex to collapse runs of whitespace into a single space.
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A leading civic number followed by the rest of the address.
static CIVIC_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(.+)$").expect("valid regex"));

/// Normalizes a street name (or any free-form address fragment).
///
/// The pipeline:
/// 1. Trim and lowercase
/// 2. Strip periods
/// 3. Collapse whitespace
/// 4. Replace whole-word street types (`street`→`st`, `avenue`→`ave`, ...)
/// 5. Trim
///
/// The output is a fixed point: normalizing it again returns it unchanged.
#[must_use]
pub fn normalize_street(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let no_periods = lower.replace('.', "");
    let collapsed = WHITESPACE_RE.replace_all(&no_periods, " ");
    let replaced = STREET_TYPE_RE.replace_all(&collapsed, |caps: &Captures<'_>| {
        STREET_TYPES
            .get(&caps[1])
            .map_or_else(|| caps[1].to_string(), |short| (*short).to_string())
    });
    replaced.trim().to_string()
}

/// Derives the join key for a free-form building address.
///
/// `"123 Main Street"` becomes `"123 main st"`. Input without a leading
/// civic number is normalized as a whole. Empty input yields `""`, and a
/// civic number whose street normalizes to nothing yields the bare number
/// with no trailing space.
#[must_use]
pub fn address_key(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    CIVIC_PREFIX_RE.captures(&lower).map_or_else(
        || normalize_street(&lower),
        |caps| {
            let street = normalize_street(&caps[2]);
            if street.is_empty() {
                caps[1].to_string()
            } else {
                format!("{} {street}", &caps[1])
            }
        },
    )
}

/// Formats a civic number as it is written in an address: integral values
/// without a fractional part (`100`, not `100.0`).
#[must_use]
pub fn format_civic_number(civic: f64) -> String {
    if civic.fract() == 0.0 && civic.abs() < 1e15 {
        format!("{civic:.0}")
    } else {
        civic.to_string()
    }
}

/// Splits an address key into its civic number and street part.
///
/// Returns `None` when the key has no space (nothing to split). The civic
/// number is `None` when the first token is not numeric.
#[must_use]
pub fn split_address_key(key: &str) -> Option<(Option<f64>, &str)> {
    let (civic, street) = key.split_once(' ')?;
    Some((civic.parse::<f64>().ok(), street))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviates_street_types() {
        assert_eq!(normalize_street("Main Street"), "main st");
        assert_eq!(normalize_street("Pine Avenue"), "pine ave");
        assert_eq!(normalize_street("Pine Av"), "pine ave");
        assert_eq!(normalize_street("Beach Boulevard"), "beach blvd");
        assert_eq!(normalize_street("Trans Canada Highway"), "trans canada hwy");
    }

    #[test]
    fn leaves_partial_words_alone() {
        assert_eq!(normalize_street("Streetsville Road"), "streetsville rd");
        assert_eq!(normalize_street("Avery Place"), "avery pl");
    }

    #[test]
    fn strips_periods_and_whitespace() {
        assert_eq!(normalize_street("  N.  Main   St. "), "n main st");
        assert_eq!(normalize_street("pine st ."), "pine st");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in [
            "123 Main Street",
            "  Pine   AVENUE. ",
            "St. Paul's Court",
            "",
            "a . b",
            "Drive Drive Drive",
        ] {
            let once = normalize_street(input);
            assert_eq!(normalize_street(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn equal_addresses_share_a_key() {
        let expected = address_key("123 Main Street");
        assert_eq!(expected, "123 main st");
        assert_eq!(address_key("123 main st"), expected);
        assert_eq!(address_key("123  MAIN ST."), expected);
    }

    #[test]
    fn key_without_civic_number() {
        assert_eq!(address_key("Main Street"), "main st");
    }

    #[test]
    fn empty_key_is_defined() {
        assert_eq!(address_key(""), "");
        assert_eq!(address_key("   "), "");
    }

    #[test]
    fn civic_number_with_empty_street_has_no_trailing_space() {
        assert_eq!(address_key("123 ."), "123");
        assert_eq!(address_key("123 ..."), "123");
    }

    #[test]
    fn formats_civic_numbers() {
        assert_eq!(format_civic_number(100.0), "100");
        assert_eq!(format_civic_number(12.5), "12.5");
    }

    #[test]
    fn splits_key() {
        assert_eq!(split_address_key("100 pine st"), Some((Some(100.0), "pine st")));
        assert_eq!(split_address_key("rear pine st"), Some((None, "pine st")));
        assert_eq!(split_address_key("pine"), None);
    }
}
