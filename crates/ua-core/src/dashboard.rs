//! Dashboard composition.
//!
//! Storage hands over a [`DashboardSnapshot`] of raw rows; [`compose`] turns
//! it into the payload served to operators. Presence is evaluated here, at
//! query time, so the snapshot never carries derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::parse_client_timestamp;
use crate::event_kind::EventKind;
use crate::format::{DisplayOffset, action_label, format_duration};
use crate::presence::OnlineWindow;
use crate::profile::{Profile, label};

/// Settings that shape the rendered dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardOptions {
    pub online_window: OnlineWindow,
    pub display_offset: DisplayOffset,
}

/// Counters read straight from the stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub profiles: i64,
    pub events: i64,
    pub error_events: i64,
    pub events_today: i64,
    pub profiles_today: i64,
}

/// Number of events of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCount {
    pub kind: String,
    pub count: i64,
}

/// A profile joined with its usage total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUsage {
    pub profile: Profile,
    pub total_minutes: i64,
}

/// A raw event joined with its author's display details.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEvent {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub payload: Value,
    pub timestamp: Option<String>,
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

/// Everything the dashboard needs, read in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub counts: StoreCounts,
    pub popular: Vec<KindCount>,
    pub profiles: Vec<ProfileUsage>,
    pub recent: Vec<RecentEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub online_users: i64,
    pub total_actions: i64,
    pub total_errors: i64,
    pub today_actions: i64,
    pub today_new_users: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularAction {
    pub action: String,
    pub kind: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub total_minutes: i64,
    pub usage_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub status: PresenceStatus,
    pub platform: String,
    pub actions_count: i64,
    pub last_seen: String,
    pub first_seen: String,
    pub last_action: String,
    pub session_data: SessionData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub kind: String,
    pub details: Value,
    pub timestamp: String,
}

/// The dashboard payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub popular_actions: Vec<PopularAction>,
    pub users: Vec<UserRow>,
    pub recent_activity: Vec<ActivityRow>,
}

/// Builds the dashboard payload for `now`.
pub fn compose(
    snapshot: DashboardSnapshot,
    now: DateTime<Utc>,
    options: DashboardOptions,
) -> Dashboard {
    let DashboardSnapshot {
        counts,
        popular,
        profiles,
        recent,
    } = snapshot;
    let offset = options.display_offset;

    let users: Vec<UserRow> = profiles
        .into_iter()
        .map(|usage| user_row(usage, now, options))
        .collect();
    let online_users = users
        .iter()
        .filter(|user| user.status == PresenceStatus::Online)
        .count();

    let popular_actions = popular
        .into_iter()
        .filter(|entry| {
            entry
                .kind
                .parse::<EventKind>()
                .is_ok_and(|kind| kind.is_ranked())
        })
        .map(|entry| PopularAction {
            action: action_label(&entry.kind),
            kind: entry.kind,
            count: entry.count,
        })
        .collect();

    let recent_activity = recent
        .into_iter()
        .map(|event| ActivityRow {
            user_name: label(event.display_name.as_deref(), event.handle.as_deref()),
            action: action_label(&event.kind),
            timestamp: offset.humanize(event.timestamp.as_deref()),
            user_id: event.user_id,
            kind: event.kind,
            details: event.payload,
        })
        .collect();

    Dashboard {
        stats: DashboardStats {
            total_users: counts.profiles,
            online_users: i64::try_from(online_users).unwrap_or(i64::MAX),
            total_actions: counts.events,
            total_errors: counts.error_events,
            today_actions: counts.events_today,
            today_new_users: counts.profiles_today,
        },
        popular_actions,
        users,
        recent_activity,
    }
}

fn user_row(usage: ProfileUsage, now: DateTime<Utc>, options: DashboardOptions) -> UserRow {
    let ProfileUsage {
        profile,
        total_minutes,
    } = usage;
    let online = parse_client_timestamp(&profile.last_seen)
        .is_ok_and(|last_seen| options.online_window.is_online(last_seen, now));
    let offset = options.display_offset;

    UserRow {
        name: profile.label(),
        status: if online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        },
        last_seen: offset.humanize(Some(&profile.last_seen)),
        first_seen: offset.humanize(Some(&profile.first_seen)),
        last_action: action_label(&profile.last_action),
        session_data: SessionData {
            total_minutes,
            usage_time: format_duration(total_minutes),
        },
        id: profile.user_id,
        display_name: profile.display_name,
        handle: profile.handle,
        platform: profile.platform,
        actions_count: profile.total_actions,
    }
}
