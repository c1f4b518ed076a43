//! Wrapper around the bcrypt comparison primitive.
//!
//! Malformed stored hashes are surfaced distinctly from "no match": a hash
//! that is not bcrypt-shaped can never be recovered by this engine, and
//! treating it as an ordinary miss would silently burn a full dictionary
//! scan per run on a record that is broken by construction.

use crate::error::Error;

/// Algorithm tag some exports prepend to the stored value.
const BCRYPT_TAG: &str = "{bcrypt}";

/// Length of a modular-crypt bcrypt string (`$2b$12$` + 53 chars).
const BCRYPT_HASH_LEN: usize = 60;

/// Result of comparing one candidate word against one stored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    NoMatch,
    /// The stored value could not be interpreted as a bcrypt hash.
    MalformedHash,
}

/// A stored password hash validated as bcrypt-shaped, with any `{bcrypt}`
/// tag already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHash(String);

impl StoredHash {
    /// Validates the shape of an exported hash value. This runs once per
    /// record, so a broken hash is reported once instead of failing every
    /// candidate word.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let hash = raw.strip_prefix(BCRYPT_TAG).unwrap_or(raw);
        if !hash.starts_with("$2") {
            return Err(Error::MalformedHash {
                reason: "missing $2 version prefix".to_owned(),
            });
        }
        if hash.len() != BCRYPT_HASH_LEN {
            return Err(Error::MalformedHash {
                reason: format!("expected {BCRYPT_HASH_LEN} chars, got {}", hash.len()),
            });
        }
        Ok(Self(hash.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Compares one candidate against the stored hash.
///
/// Comparison errors out of the bcrypt primitive mean the hash slipped past
/// the shape check but is still unusable, and map to `MalformedHash`.
pub fn verify(hash: &StoredHash, candidate: &str) -> Verification {
    match bcrypt::verify(candidate, hash.as_str()) {
        Ok(true) => Verification::Match,
        Ok(false) => Verification::NoMatch,
        Err(_) => Verification::MalformedHash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum cost keeps the hot comparisons fast under test.
    const TEST_COST: u32 = 4;

    #[test]
    fn parse_strips_algorithm_tag() {
        let raw = format!("{{bcrypt}}{}", bcrypt::hash("secret", TEST_COST).unwrap());
        let stored = StoredHash::parse(&raw).unwrap();
        assert!(stored.as_str().starts_with("$2"));
        assert_eq!(verify(&stored, "secret"), Verification::Match);
    }

    #[test]
    fn parse_rejects_non_bcrypt_values() {
        for raw in ["", "plaintext", "5f4dcc3b5aa765d61d8327deb882cf99", "$2b$04$short"] {
            assert!(
                matches!(StoredHash::parse(raw), Err(Error::MalformedHash { .. })),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn verify_match_and_miss() {
        let hash = bcrypt::hash("secret", TEST_COST).unwrap();
        let stored = StoredHash::parse(&hash).unwrap();
        assert_eq!(verify(&stored, "secret"), Verification::Match);
        assert_eq!(verify(&stored, "wrong"), Verification::NoMatch);
    }
}
