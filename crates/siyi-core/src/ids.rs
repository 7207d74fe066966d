//! Message identifiers.
//!
//! A [`MessageId`] is either a random 128-bit UUID or an opaque string
//! chosen by the peer. Equality is by normalized string form: UUID-shaped
//! strings are canonicalized to lowercase hyphenated form so that
//! `"ABCDEF00-..."` and `"abcdef00-..."` correlate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Correlation and identity key of a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a fresh random id (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing value, normalizing UUID-shaped strings.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        match Uuid::try_parse(&s) {
            Ok(uuid) => Self(uuid.hyphenated().to_string()),
            Err(_) => Self(s),
        }
    }

    /// Return the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the normalized `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_string(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique_uuids() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(Uuid::try_parse(a.as_str()).is_ok());
    }

    #[test]
    fn uuid_strings_normalize_case() {
        let upper = MessageId::from("67E55044-10B1-426F-9247-BB680E5FE0C8");
        let lower = MessageId::from("67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn simple_uuid_form_normalizes_to_hyphenated() {
        let id = MessageId::from("67e5504410b1426f9247bb680e5fe0c8");
        assert_eq!(id.as_str(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn opaque_strings_are_kept_verbatim() {
        let id = MessageId::from("req-42");
        assert_eq!(id.as_str(), "req-42");
        assert_eq!(id.to_string(), "req-42");
    }

    #[test]
    fn from_uuid_matches_string_form() {
        let uuid = Uuid::new_v4();
        assert_eq!(MessageId::from(uuid), MessageId::from(uuid.to_string()));
    }

    #[test]
    fn serde_is_transparent_and_normalizing() {
        let id: MessageId =
            serde_json::from_str("\"67E55044-10B1-426F-9247-BB680E5FE0C8\"").unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"67e55044-10b1-426f-9247-bb680e5fe0c8\""
        );
    }

    #[test]
    fn non_string_id_is_rejected() {
        assert!(serde_json::from_str::<MessageId>("42").is_err());
    }
}
