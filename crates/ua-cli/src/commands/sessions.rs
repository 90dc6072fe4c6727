//! Sessions command.

use std::io::Write;

use anyhow::Result;
use ua_core::{DisplayOffset, Session, format_duration};
use ua_directory::DirectoryLookup;

use crate::service::Analytics;

pub async fn run<W: Write, D: DirectoryLookup>(
    writer: &mut W,
    analytics: &Analytics<D>,
    user: &str,
) -> Result<()> {
    let sessions = analytics.user_sessions(user).await?;
    if sessions.is_empty() {
        writeln!(writer, "No sessions recorded for {user}.")?;
        return Ok(());
    }
    let offset = analytics.settings().dashboard.display_offset;
    for session in &sessions {
        writeln!(writer, "{}", format_session(session, offset))?;
    }
    Ok(())
}

fn format_session(session: &Session, offset: DisplayOffset) -> String {
    let duration = session
        .duration_minutes
        .map_or_else(|| "-".to_string(), format_duration);
    format!(
        "#{} {} {} -> {} ({duration}, {})",
        session.id,
        session.status,
        offset.humanize(Some(&session.start_time)),
        offset.humanize(session.end_time.as_deref()),
        session.platform
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use ua_core::SessionStatus;

    #[test]
    fn open_and_closed_sessions_render() {
        let closed = Session {
            id: 3,
            user_id: "42".to_string(),
            start_time: "2025-03-01T10:00:00.000Z".to_string(),
            end_time: Some("2025-03-01T11:05:00.000Z".to_string()),
            duration_minutes: Some(65),
            platform: "ios".to_string(),
            status: SessionStatus::Closed,
        };
        let open = Session {
            id: 4,
            end_time: None,
            duration_minutes: None,
            status: SessionStatus::Open,
            ..closed.clone()
        };

        let offset = DisplayOffset::default();
        assert_snapshot!(
            format_session(&closed, offset),
            @"#3 closed 01.03.2025 13:00:00 -> 01.03.2025 14:05:00 (1h5m, ios)"
        );
        assert_snapshot!(
            format_session(&open, offset),
            @"#4 open 01.03.2025 13:00:00 -> - (-, ios)"
        );
    }
}
