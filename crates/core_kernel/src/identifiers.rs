//! Strongly-typed identifiers for domain entities
//!
//! Event identities are UUIDs assigned by the store. Case identifiers are
//! human-chosen strings (e.g. `KOE-2024-017`) and are validated so they can be
//! used verbatim as file names and database keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_id!(EventId, "EVT");

/// Maximum length of a case identifier
pub const SAK_ID_MAX_LEN: usize = 128;

/// Reasons a string is rejected as a case identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SakIdError {
    #[error("Case id must not be empty")]
    Empty,

    #[error("Case id exceeds 128 characters")]
    TooLong,

    #[error("Case id contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// Identifier of a case (*sak*)
///
/// Only ASCII letters, digits, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SakId(String);

impl SakId {
    /// Creates a validated case identifier
    ///
    /// # Errors
    ///
    /// Returns `SakIdError` if the value is empty, too long or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, SakIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(SakIdError::Empty);
        }
        if value.len() > SAK_ID_MAX_LEN {
            return Err(SakIdError::TooLong);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SakIdError::InvalidCharacter(c));
        }
        Ok(Self(value))
    }

    /// Generates a fresh identifier of the form `SAK-<uuid v7>`
    pub fn generate() -> Self {
        Self(format!("SAK-{}", Uuid::now_v7().simple()))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SakId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SakId {
    type Err = SakIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SakId {
    type Error = SakIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SakId> for String {
    fn from(id: SakId) -> String {
        id.0
    }
}

impl AsRef<str> for SakId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_display() {
        let id = EventId::new();
        assert!(id.to_string().starts_with("EVT-"));
    }

    #[test]
    fn test_event_id_parsing() {
        let original = EventId::new();
        let parsed: EventId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_sak_id_rejects_path_separators() {
        assert_eq!(SakId::new("../etc"), Err(SakIdError::InvalidCharacter('.')));
        assert_eq!(SakId::new("a/b"), Err(SakIdError::InvalidCharacter('/')));
    }

    #[test]
    fn test_sak_id_generate_is_valid() {
        let id = SakId::generate();
        assert!(SakId::new(id.as_str()).is_ok());
        assert!(id.as_str().starts_with("SAK-"));
    }
}
