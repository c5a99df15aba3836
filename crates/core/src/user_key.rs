//! User key identifier type.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A user key: a UUID v4 identifying the owner of a fingerprint set.
///
/// Input is accepted case-insensitively; the canonical form (storage, wire
/// responses, log fields) is lowercase hyphenated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(Uuid);

impl UserKey {
    /// Parse a user key from its textual form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| Error::InvalidUserKey(format!("{s:?}: {e}")))?;
        Ok(Self(uuid))
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Short prefix used in cache keys and log fields.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl FromStr for UserKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for UserKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserKey({})", self.0)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Uuid renders lowercase hyphenated, which is the canonical form.
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_case_insensitive() {
        let lower = UserKey::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let upper = UserKey::parse("550E8400-E29B-41D4-A716-446655440000").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(UserKey::parse("not-a-uuid").is_err());
        assert!(UserKey::parse("").is_err());
    }

    #[test]
    fn short_is_stable_prefix() {
        let key = UserKey::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(key.short(), "550e8400");
    }
}
