//! Property tests for statement quoting, duration literals and generated credentials.

use influxdb_operator::credentials::{generate_password, generate_username};
use influxdb_operator::influxdb::query::{is_duration_literal, quote_ident, quote_literal};
use proptest::prelude::*;

/// Read one quoted token starting at the beginning of `input`, returning the
/// unescaped value and whatever follows the closing quote.
fn read_quoted(input: &str, quote: char) -> Option<(String, &str)> {
    let mut chars = input.char_indices();
    if chars.next()?.1 != quote {
        return None;
    }
    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            c if c == quote => return Some((value, &input[i + c.len_utf8()..])),
            c => value.push(c),
        }
    }
    None
}

proptest! {
    #[test]
    fn quoted_identifier_cannot_be_escaped_from(ident in ".*") {
        let quoted = quote_ident(&ident);
        let (value, rest) = read_quoted(&quoted, '"').expect("well-formed identifier");
        prop_assert_eq!(value, ident);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn quoted_literal_cannot_be_escaped_from(literal in ".*") {
        let quoted = quote_literal(&literal);
        let (value, rest) = read_quoted(&quoted, '\'').expect("well-formed literal");
        prop_assert_eq!(value, literal);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn compound_durations_are_accepted(parts in prop::collection::vec((1u32..10_000, prop::sample::select(vec!["ns", "u", "ms", "s", "m", "h", "d", "w"])), 1..4)) {
        let literal: String = parts.iter().map(|(n, unit)| format!("{}{}", n, unit)).collect();
        prop_assert!(is_duration_literal(&literal));
    }

    #[test]
    fn durations_without_units_are_rejected(n in 0u32..100_000) {
        prop_assert!(!is_duration_literal(&n.to_string()));
    }
}

#[test]
fn generated_credentials_are_url_safe_and_distinct() {
    let mut usernames = std::collections::HashSet::new();
    for _ in 0..200 {
        let username = generate_username();
        let password = generate_password();
        assert!(username.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(password
            .expose_secret()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(usernames.insert(username));
    }
}
