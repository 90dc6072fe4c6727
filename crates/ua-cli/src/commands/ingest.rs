//! Ingest command: records one event from the command line.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::Value;
use ua_core::IngestRequest;
use ua_db::SessionEffect;
use ua_directory::DirectoryLookup;

use crate::service::{Analytics, IngestOutcome};

/// Arguments of `ua ingest`.
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub user: String,
    pub action: String,
    pub details: Option<String>,
    pub timestamp: Option<String>,
}

pub async fn run<W: Write, D: DirectoryLookup>(
    writer: &mut W,
    analytics: &Analytics<D>,
    args: IngestArgs,
) -> Result<()> {
    let request = build_request(args)?;
    match analytics.ingest(request).await? {
        IngestOutcome::Stored(receipt) => {
            writeln!(
                writer,
                "Stored event {}{}",
                receipt.event_id,
                describe_session(receipt.session)
            )?;
        }
        IngestOutcome::Placeholder => {
            writeln!(writer, "Placeholder user, nothing stored.")?;
        }
    }
    Ok(())
}

fn build_request(args: IngestArgs) -> Result<IngestRequest> {
    let details = args
        .details
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--details must be valid JSON")?;
    Ok(IngestRequest {
        user_id: Some(Value::String(args.user)),
        action: Some(Value::String(args.action)),
        details,
        timestamp: args.timestamp.map(Value::String),
    })
}

fn describe_session(effect: SessionEffect) -> String {
    match effect {
        SessionEffect::None => String::new(),
        SessionEffect::Opened {
            session_id,
            superseded: 0,
        } => format!(", opened session {session_id}"),
        SessionEffect::Opened {
            session_id,
            superseded,
        } => format!(", opened session {session_id} (abandoned {superseded} open)"),
        SessionEffect::Closed {
            session_id,
            duration_minutes,
        } => format!(", closed session {session_id} after {duration_minutes} min"),
        SessionEffect::Unpaired => ", no open session to close".to_string(),
        SessionEffect::Skipped => ", session skipped: unparsable timestamp".to_string(),
    }
}
