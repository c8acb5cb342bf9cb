use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_USER_ID_LEN: usize = 128;

/// Opaque, already-authenticated user identifier.
///
/// Doubles as the first directory segment under the storage root, so it is
/// restricted to `[A-Za-z0-9_-]` and can never traverse out of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUserId;

impl fmt::Display for InvalidUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid user id")
    }
}

impl std::error::Error for InvalidUserId {}

impl UserId {
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidUserId> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= MAX_USER_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(value))
        } else {
            Err(InvalidUserId)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = InvalidUserId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_like_ids() {
        let id = UserId::parse("6f1c2a9e-1d3b-4c2f-9a55-0e7f2b1d9c44").unwrap();
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn rejects_path_segments() {
        for bad in ["", "..", "a/b", "a\\b", "x.y", "user id", "é"] {
            assert!(UserId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(UserId::parse("a".repeat(129)).is_err());
    }
}
