//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types and ingest requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or null.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A field had the wrong JSON type.
    #[error("{field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// Invalid open session policy value.
    #[error("invalid open session policy: {value}")]
    InvalidSessionPolicy { value: String },

    /// A configuration value was out of range.
    #[error("invalid {field}: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: String,
    },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after trimming and validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                if trimmed.len() == id.len() {
                    return Ok(Self(id));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// Chat platforms hand out numeric ids; they are carried in their decimal
    /// string form so that every store keys users the same way.
    UserId, "user_id"
);

/// How a new `session_start` treats sessions that are still open for the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenSessionPolicy {
    /// Close earlier open sessions as abandoned (zero minutes) before opening a new one.
    #[default]
    Supersede,
    /// Leave earlier sessions open; every start creates another open row.
    Permissive,
}

impl OpenSessionPolicy {
    /// String representation used in configuration and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Supersede => "supersede",
            Self::Permissive => "permissive",
        }
    }
}

impl fmt::Display for OpenSessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OpenSessionPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supersede" => Ok(Self::Supersede),
            "permissive" => Ok(Self::Permissive),
            _ => Err(ValidationError::InvalidSessionPolicy {
                value: s.to_string(),
            }),
        }
    }
}
