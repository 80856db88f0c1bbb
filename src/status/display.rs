//! Human-readable session status.

use chrono::{DateTime, Utc};

use super::SessionInfo;
use crate::connection::ViewStatus;

/// Describe how long ago `timestamp` was, relative to `now`.
///
/// Timestamps in the future read as "just now".
#[must_use]
pub fn format_relative(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - timestamp).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "just now".to_string()
    } else if hours < 1 {
        plural(minutes, "minute")
    } else if days < 1 {
        plural(hours, "hour")
    } else {
        plural(days, "day")
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

/// Window title for a view named `name`.
///
/// While connected the title is just the session name; otherwise the
/// connectivity is appended.
#[must_use]
pub fn title_for(name: &str, status: &ViewStatus) -> String {
    match status {
        ViewStatus::Connected => name.to_string(),
        other => format!("{name} ({other})"),
    }
}

/// One-line summary of a session, plus the view's connectivity when a view
/// is attached.
#[must_use]
pub fn status_line(
    session: &SessionInfo,
    view: Option<&ViewStatus>,
    now: DateTime<Utc>,
) -> String {
    let liveness = if session.connected { "connected" } else { "idle" };
    let mut line = format!(
        "{} | created {} | last active {} | {}",
        session.name,
        format_relative(session.created_at, now),
        format_relative(session.last_active, now),
        liveness,
    );
    if let Some(view) = view {
        line.push_str(&format!(" | view: {view}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn ago(seconds: i64) -> DateTime<Utc> {
        now() - Duration::seconds(seconds)
    }

    #[test]
    fn test_format_relative() {
        let cases = [
            (30, "just now"),
            (60, "1 minute ago"),
            (5 * 60, "5 minutes ago"),
            (60 * 60, "1 hour ago"),
            (3 * 60 * 60, "3 hours ago"),
            (24 * 60 * 60, "1 day ago"),
            (3 * 24 * 60 * 60, "3 days ago"),
        ];
        for (seconds, expected) in cases {
            assert_eq!(format_relative(ago(seconds), now()), expected, "{seconds}s");
        }
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        assert_eq!(format_relative(now() + Duration::seconds(90), now()), "just now");
    }

    #[test]
    fn test_title_for() {
        assert_eq!(title_for("build", &ViewStatus::Connected), "build");
        assert_eq!(
            title_for(
                "build",
                &ViewStatus::Reconnecting {
                    attempt: 1,
                    max_attempts: 10
                }
            ),
            "build (reconnecting 1/10)"
        );
        assert_eq!(
            title_for("build", &ViewStatus::SessionEnded),
            "build (session ended)"
        );
    }

    #[test]
    fn test_status_line() {
        let session = SessionInfo {
            id: "a1".to_string(),
            name: "build".to_string(),
            created_at: ago(2 * 60 * 60),
            last_active: ago(10),
            connected: false,
        };
        assert_eq!(
            status_line(&session, None, now()),
            "build | created 2 hours ago | last active just now | idle"
        );
        assert_eq!(
            status_line(&session, Some(&ViewStatus::Connected), now()),
            "build | created 2 hours ago | last active just now | idle | view: connected"
        );
    }
}
