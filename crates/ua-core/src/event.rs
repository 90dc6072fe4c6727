//! Client events as received at the ingest boundary.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::event_kind::EventKind;
use crate::types::{UserId, ValidationError};

/// Platform recorded when a client does not report one.
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// A client timestamp that could not be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparsable timestamp {raw:?}")]
pub struct TimestampParseError {
    pub raw: String,
}

/// The ingest request body exactly as clients send it.
///
/// Fields are kept loosely typed so that malformed input turns into a
/// [`ValidationError`] instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Result of validating an [`IngestRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The event feeds every store.
    Accepted(Event),
    /// The user id is a placeholder; acknowledge and drop.
    Placeholder(UserId),
}

/// A validated client event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub user_id: UserId,
    pub kind: EventKind,
    pub payload: Map<String, Value>,
    /// The timestamp string the client sent, if any.
    pub raw_timestamp: Option<String>,
    /// When the event happened, in UTC. `None` when the client timestamp was unparsable.
    pub occurred_at: Option<DateTime<Utc>>,
    /// When the server accepted the event.
    pub received_at: DateTime<Utc>,
}

impl IngestRequest {
    /// Parses a raw request body. Anything but a JSON object is rejected,
    /// including arrays that serde would otherwise map onto the fields.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let not_object = || ValidationError::WrongType {
            field: "body",
            expected: "a JSON object",
        };
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => {
                serde_json::from_value(Value::Object(fields)).map_err(|_| not_object())
            }
            _ => Err(not_object()),
        }
    }

    /// Validates the request.
    ///
    /// A missing timestamp falls back to `received_at`; an unparsable one is
    /// kept verbatim and leaves `occurred_at` empty.
    pub fn validate(
        self,
        placeholder_ids: &[String],
        received_at: DateTime<Utc>,
    ) -> Result<Admission, ValidationError> {
        let user_id = parse_user_id(self.user_id)?;
        let kind: EventKind = match self.action {
            None | Some(Value::Null) => return Err(ValidationError::Missing { field: "action" }),
            Some(Value::String(action)) => action.parse()?,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "action",
                    expected: "a string",
                });
            }
        };
        let payload = match self.details {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "details",
                    expected: "an object",
                });
            }
        };

        if placeholder_ids
            .iter()
            .any(|placeholder| placeholder.eq_ignore_ascii_case(user_id.as_str()))
        {
            return Ok(Admission::Placeholder(user_id));
        }

        let (raw_timestamp, occurred_at) = match self.timestamp {
            None | Some(Value::Null) => (None, Some(received_at)),
            Some(Value::String(raw)) if raw.trim().is_empty() => (None, Some(received_at)),
            Some(Value::String(raw)) => {
                let parsed = parse_client_timestamp(&raw).ok();
                (Some(raw), parsed)
            }
            Some(other) => (Some(other.to_string()), None),
        };

        Ok(Admission::Accepted(Event {
            user_id,
            kind,
            payload,
            raw_timestamp,
            occurred_at,
            received_at,
        }))
    }
}

impl Event {
    /// Platform reported in the payload.
    pub fn platform(&self) -> &str {
        self.payload
            .get("platform")
            .and_then(Value::as_str)
            .filter(|platform| !platform.trim().is_empty())
            .unwrap_or(UNKNOWN_PLATFORM)
    }

    /// Time used for presence and profile bookkeeping.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.occurred_at.unwrap_or(self.received_at)
    }

    /// The parse failure for this event's timestamp, if any.
    pub fn timestamp_error(&self) -> Option<TimestampParseError> {
        match (&self.occurred_at, &self.raw_timestamp) {
            (None, Some(raw)) => Some(TimestampParseError { raw: raw.clone() }),
            _ => None,
        }
    }

    /// Message carried by an error-kind event.
    pub fn error_message(&self) -> String {
        ["message", "error"]
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))
            .unwrap_or("client error")
            .to_string()
    }

    /// The payload serialized as JSON text.
    pub fn payload_json(&self) -> String {
        Value::Object(self.payload.clone()).to_string()
    }
}

fn parse_user_id(value: Option<Value>) -> Result<UserId, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::Missing { field: "user_id" }),
        Some(Value::String(id)) => UserId::new(id),
        Some(Value::Number(number)) => {
            let id = number
                .as_i64()
                .map(|n| n.to_string())
                .or_else(|| number.as_u64().map(|n| n.to_string()))
                .ok_or(ValidationError::WrongType {
                    field: "user_id",
                    expected: "a string or an integer",
                })?;
            UserId::new(id)
        }
        Some(_) => Err(ValidationError::WrongType {
            field: "user_id",
            expected: "a string or an integer",
        }),
    }
}

/// Parses a client timestamp into UTC.
///
/// Accepts RFC 3339 with any offset, and naive ISO 8601 which is read as UTC.
pub fn parse_client_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampParseError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| TimestampParseError {
            raw: raw.to_string(),
        })
}

/// Canonical stored form: RFC 3339, milliseconds, `Z` suffix.
///
/// Lexicographic order of these strings matches chronological order.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
