//! Fingerprint identifier type.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fingerprint: 64 lowercase hex characters interpreted as a SHA-256
/// digest. The server treats the digest as opaque; only the textual
/// contract matters.
///
/// Parsing canonicalizes ASCII uppercase hex to lowercase and rejects
/// everything else, so a constructed value always satisfies
/// `^[a-f0-9]{64}$`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse and canonicalize a fingerprint.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(Error::InvalidFingerprint(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidFingerprint(
                "contains non-hex characters".to_string(),
            ));
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Ok(Self(s.to_string()))
        }
    }

    /// The canonical lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}…)", &self.0[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "a3f5c0d1e2b4968778695a4b3c2d1e0f11223344556677889900aabbccddeeff";

    #[test]
    fn parse_valid() {
        let fp = Fingerprint::parse(VALID).unwrap();
        assert_eq!(fp.as_str(), VALID);
    }

    #[test]
    fn parse_lowercases_uppercase_hex() {
        let fp = Fingerprint::parse(&VALID.to_ascii_uppercase()).unwrap();
        assert_eq!(fp.as_str(), VALID);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Fingerprint::parse("abc123").is_err());
        assert!(Fingerprint::parse(&format!("{VALID}0")).is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        let mut s = VALID.to_string();
        s.replace_range(0..1, "g");
        assert!(Fingerprint::parse(&s).is_err());
    }

}
