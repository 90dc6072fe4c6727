//! Core domain logic for usage analytics.
//!
//! This crate contains the fundamental types and logic for:
//! - Ingest validation: turning loosely typed client reports into [`Event`]s
//! - Session arithmetic: clamped, floored session durations
//! - Presence: online status from the recency of the last event
//! - Dashboard composition and display formatting

pub mod dashboard;
pub mod error_log;
pub mod event;
pub mod event_kind;
pub mod format;
pub mod presence;
pub mod profile;
pub mod session;
pub mod types;

pub use dashboard::{Dashboard, DashboardOptions, DashboardSnapshot, compose};
pub use error_log::{ErrorEntry, ErrorSource};
pub use event::{
    Admission, Event, IngestRequest, TimestampParseError, format_timestamp,
    parse_client_timestamp,
};
pub use event_kind::EventKind;
pub use format::{DisplayOffset, action_label, format_duration};
pub use presence::OnlineWindow;
pub use profile::{AudienceMember, Profile, ProfileHint};
pub use session::{Session, SessionStatus, session_duration_minutes};
pub use types::{OpenSessionPolicy, UserId, ValidationError};
