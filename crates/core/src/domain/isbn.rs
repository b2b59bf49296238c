//! ISBN normalization
//!
//! Every book is keyed by a canonical ISBN-13. [`Isbn13::parse`] is the only
//! way to build one, so any `Isbn13` value in the system is already normalized.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used when lifting a 10-character ISBN into the 13-digit space
const ISBN10_PREFIX: &str = "978";

/// Canonical 13-digit ISBN
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn13(String);

impl Isbn13 {
    /// Normalize a raw identifier.
    ///
    /// Whitespace and hyphens are stripped. A 13-digit string is kept as is;
    /// a 10-character form (9 digits plus a digit or `X`) is converted to
    /// ISBN-13 with a recomputed check digit. Anything else yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if cleaned.len() == 13 && cleaned.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Self(cleaned));
        }

        if is_isbn10(&cleaned) {
            return Some(Self(convert_isbn10(&cleaned)));
        }

        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Isbn13 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Isbn13 {
    type Error = super::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Isbn13::parse(&value).ok_or(super::DomainError::InvalidIsbn(value))
    }
}

impl From<Isbn13> for String {
    fn from(isbn: Isbn13) -> Self {
        isbn.0
    }
}

fn is_isbn10(cleaned: &str) -> bool {
    let bytes = cleaned.as_bytes();
    bytes.len() == 10
        && bytes[..9].iter().all(u8::is_ascii_digit)
        && (bytes[9].is_ascii_digit() || bytes[9] == b'X' || bytes[9] == b'x')
}

/// The ISBN-10 check character is discarded; only the 9 body digits carry over.
fn convert_isbn10(isbn10: &str) -> String {
    let mut base = String::with_capacity(13);
    base.push_str(ISBN10_PREFIX);
    base.push_str(&isbn10[..9]);

    let sum: u32 = base
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 {
                digit
            } else {
                digit * 3
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;

    base.push(char::from(b'0' + check as u8));
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn13_kept_as_is() {
        let isbn = Isbn13::parse("9784065199817").unwrap();
        assert_eq!(isbn.as_str(), "9784065199817");
    }

    #[test]
    fn test_separators_are_stripped() {
        let isbn = Isbn13::parse(" 978-4-06-519981-7 ").unwrap();
        assert_eq!(isbn.as_str(), "9784065199817");
    }

    #[test]
    fn test_isbn10_converted_with_check_digit() {
        assert_eq!(Isbn13::parse("0306406152").unwrap().as_str(), "9780306406157");
        assert_eq!(Isbn13::parse("0-8044-2957-X").unwrap().as_str(), "9780804429573");
        assert_eq!(Isbn13::parse("080442957x").unwrap().as_str(), "9780804429573");
    }

    #[test]
    fn test_isbn10_check_character_not_validated() {
        // Wrong trailing character still converts; the body digits decide the result
        assert_eq!(Isbn13::parse("0306406150").unwrap().as_str(), "9780306406157");
    }

    #[test]
    fn test_converted_check_digit_is_valid_isbn13() {
        for raw in ["4101010013", "4062938421", "487311778X", "0131103628"] {
            let isbn = Isbn13::parse(raw).unwrap();
            let sum: u32 = isbn
                .as_str()
                .bytes()
                .enumerate()
                .map(|(i, b)| u32::from(b - b'0') * if i % 2 == 0 { 1 } else { 3 })
                .sum();
            assert_eq!(sum % 10, 0, "{} -> {} should checksum", raw, isbn);
            assert!(isbn.as_str().starts_with("978"));
        }
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        for raw in [
            "",
            "   ",
            "12345",
            "978406519981",   // 12 digits
            "97840651998170", // 14 digits
            "978406519981X",  // X only allowed in 10-char form
            "X306406152",
            "03064O6152", // letter O
            "abcdefghij",
        ] {
            assert!(Isbn13::parse(raw).is_none(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_serde_goes_through_normalization() {
        let isbn: Isbn13 = serde_json::from_str("\"0306406152\"").unwrap();
        assert_eq!(isbn.as_str(), "9780306406157");

        assert!(serde_json::from_str::<Isbn13>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&isbn).unwrap(), "\"9780306406157\"");
    }
}
