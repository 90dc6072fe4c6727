//! Operator-facing log of failures seen at ingest.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a logged error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// An `error` event reported by a client.
    Client,
    /// A request rejected at validation.
    Validation,
    /// An event whose timestamp could not be parsed.
    Timestamp,
    /// A storage failure while ingesting.
    Storage,
}

impl ErrorSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Validation => "validation",
            Self::Timestamp => "timestamp",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub source: String,
    pub message: String,
    pub details: String,
    pub recorded_at: String,
}
