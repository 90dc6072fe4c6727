//! Dashboard command.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use ua_core::Dashboard;
use ua_core::dashboard::PresenceStatus;
use ua_directory::DirectoryLookup;

use crate::service::Analytics;

pub async fn run<W: Write, D: DirectoryLookup>(
    writer: &mut W,
    analytics: &Analytics<D>,
    json: bool,
) -> Result<()> {
    let dashboard = analytics.dashboard(Utc::now()).await?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&dashboard)?)?;
    } else {
        writeln!(writer, "{}", format_dashboard(&dashboard))?;
    }
    Ok(())
}

/// Renders the dashboard as plain text.
pub fn format_dashboard(dashboard: &Dashboard) -> String {
    let stats = &dashboard.stats;
    let mut lines = vec![
        "USAGE DASHBOARD".to_string(),
        format!(
            "Users:  {} ({} online, {} new today)",
            stats.total_users, stats.online_users, stats.today_new_users
        ),
        format!("Events: {} ({} today)", stats.total_actions, stats.today_actions),
        format!("Errors: {}", stats.total_errors),
        String::new(),
        "POPULAR ACTIONS".to_string(),
    ];
    if dashboard.popular_actions.is_empty() {
        lines.push("  (none)".to_string());
    }
    for entry in &dashboard.popular_actions {
        lines.push(format!("  {}: {}", entry.action, entry.count));
    }

    lines.push(String::new());
    lines.push("USERS".to_string());
    if dashboard.users.is_empty() {
        lines.push("  (none)".to_string());
    }
    for user in &dashboard.users {
        let status = match user.status {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        };
        lines.push(format!(
            "  [{status}] {} | {} | {} actions | {} | last seen {}",
            user.name,
            user.platform,
            user.actions_count,
            user.session_data.usage_time,
            user.last_seen
        ));
    }

    lines.push(String::new());
    lines.push("RECENT ACTIVITY".to_string());
    if dashboard.recent_activity.is_empty() {
        lines.push("  (none)".to_string());
    }
    for activity in &dashboard.recent_activity {
        lines.push(format!(
            "  {} {}: {}",
            activity.timestamp, activity.user_name, activity.action
        ));
    }

    lines.join("\n")
}
