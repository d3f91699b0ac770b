//! Countdown and dismissible "updated" notification.

use crate::cache::UNKNOWN_VERSION;
use crate::errors::Result;
use crate::update::UpdateStatus;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How long after an update the notification is offered
pub const ANNOUNCE_WINDOW: TimeDelta = TimeDelta::hours(1);

/// Whole seconds until `restart_at_ms`, clamped at zero.
#[must_use]
pub fn countdown_seconds(restart_at_ms: i64, now_ms: i64) -> u64 {
    u64::try_from(restart_at_ms.saturating_sub(now_ms).div_euclid(1000)).unwrap_or(0)
}

/// Seconds left before the pending update restarts the server, if one is pending.
#[must_use]
pub fn restart_countdown(status: &UpdateStatus, now: DateTime<Utc>) -> Option<u64> {
    if !status.update_pending {
        return None;
    }
    status
        .restart_at
        .map(|restart_at| countdown_seconds(restart_at, now.timestamp_millis()))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DismissalRecord {
    dismissed_update_version: Option<String>,
}

/// Remembers which version's notification the user dismissed.
#[derive(Debug)]
pub struct DismissalStore {
    path: PathBuf,
    dismissed: Option<String>,
}

impl DismissalStore {
    /// Loads the store from `path`. A missing file means nothing was dismissed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dismissed = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<DismissalRecord>(&text)?.dismissed_update_version,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, dismissed })
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The dismissed version, if any
    #[must_use]
    pub fn dismissed(&self) -> Option<&str> {
        self.dismissed.as_deref()
    }

    /// Hides the notification for `version` until a newer one is installed.
    pub fn dismiss(&mut self, version: &str) -> Result<()> {
        self.dismissed = Some(version.to_string());
        self.save()
    }

    /// Clears a dismissal that belongs to an older version than `current_version`.
    pub fn observe(&mut self, current_version: &str) -> Result<()> {
        match self.dismissed.as_deref() {
            Some(dismissed) if dismissed != current_version => {
                debug!("Clearing dismissal of {} for {}", dismissed, current_version);
                self.dismissed = None;
                self.save()
            }
            _ => Ok(()),
        }
    }

    /// Whether the "updated" notification should be shown for `status`.
    ///
    /// Requires a known version and an update time within the last hour that
    /// the user has not dismissed. A newer version clears any old dismissal.
    pub fn should_announce(&mut self, status: &UpdateStatus, now: DateTime<Utc>) -> Result<bool> {
        let Some(last_update_at) = status.last_update_at.as_deref() else {
            return Ok(false);
        };
        if status.current_version == UNKNOWN_VERSION {
            return Ok(false);
        }

        self.observe(&status.current_version)?;
        if self.dismissed() == Some(status.current_version.as_str()) {
            return Ok(false);
        }

        let Ok(updated) = DateTime::parse_from_rfc3339(last_update_at) else {
            return Ok(false);
        };
        Ok(now.signed_duration_since(updated) < ANNOUNCE_WINDOW)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = DismissalRecord {
            dismissed_update_version: self.dismissed.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn status(version: &str, last_update_at: Option<&str>) -> UpdateStatus {
        UpdateStatus {
            update_pending: false,
            restart_at: None,
            update_version: None,
            current_version: version.to_string(),
            last_update_at: last_update_at.map(str::to_string),
            auto_update_show_changelogs: true,
        }
    }

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_countdown_clamps_and_floors() {
        assert_eq!(countdown_seconds(10_000, 0), 10);
        assert_eq!(countdown_seconds(10_999, 0), 10);
        assert_eq!(countdown_seconds(999, 0), 0);
        assert_eq!(countdown_seconds(0, 5_000), 0);
        assert_eq!(countdown_seconds(i64::MIN, i64::MAX), 0);
    }

    #[test]
    fn test_restart_countdown_only_while_pending() {
        let now = at("2026-01-01T00:00:00Z");
        let mut s = status("1.0", None);
        s.restart_at = Some(now.timestamp_millis() + 30_000);
        assert_eq!(restart_countdown(&s, now), None);

        s.update_pending = true;
        assert_eq!(restart_countdown(&s, now), Some(30));
    }

    #[test]
    fn test_announce_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DismissalStore::load(dir.path().join("client.json")).unwrap();
        let now = at("2026-01-01T12:30:00Z");

        assert!(!store.should_announce(&status("1.0", None), now).unwrap());
        assert!(
            !store
                .should_announce(&status("Unknown", Some("2026-01-01T12:00:00.000Z")), now)
                .unwrap()
        );
        assert!(
            !store
                .should_announce(&status("1.0", Some("2026-01-01T10:00:00.000Z")), now)
                .unwrap()
        );
        assert!(
            store
                .should_announce(&status("1.0", Some("2026-01-01T12:00:00.000Z")), now)
                .unwrap()
        );
    }

    #[test]
    fn test_dismissal_persists_until_version_bump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("client.json");
        let now = at("2026-01-01T12:30:00Z");
        let current = status("1.0", Some("2026-01-01T12:00:00.000Z"));

        let mut store = DismissalStore::load(&path).unwrap();
        store.dismiss("1.0").unwrap();
        assert!(!store.should_announce(&current, now).unwrap());

        // Survives a reload
        let mut store = DismissalStore::load(&path).unwrap();
        assert_eq!(store.dismissed(), Some("1.0"));
        assert!(!store.should_announce(&current, now).unwrap());

        // A newer version clears it
        let bumped = status("1.1", Some("2026-01-01T12:20:00.000Z"));
        assert!(store.should_announce(&bumped, now).unwrap());
        assert_eq!(DismissalStore::load(&path).unwrap().dismissed(), None);
    }
}
