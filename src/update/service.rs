use super::changelog::ChangelogGenerator;
use super::git::SourceControl;
use super::restart::RestartTrigger;
use super::{UpdateState, UpdateStatus};
use crate::cache::VersionCache;
use crate::config::{RepositoryConfig, UpdateSettings};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the update state and everything the checker and applier touch.
///
/// The check step lives in `checker.rs` and the apply step in `applier.rs`,
/// both as methods on this type.
pub struct UpdateService {
    pub(super) settings: UpdateSettings,
    pub(super) repository: RepositoryConfig,
    pub(super) db: DatabaseConnection,
    pub(super) git: Arc<dyn SourceControl>,
    pub(super) cache: VersionCache,
    pub(super) changelog: ChangelogGenerator,
    pub(super) restart: RestartTrigger,
    pub(super) state: RwLock<UpdateState>,
}

impl std::fmt::Debug for UpdateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateService")
            .field("settings", &self.settings)
            .field("repository", &self.repository)
            .field("restart", &self.restart)
            .finish_non_exhaustive()
    }
}

impl UpdateService {
    /// Creates a service with an idle update state.
    #[must_use]
    pub fn new(
        settings: UpdateSettings,
        repository: RepositoryConfig,
        db: DatabaseConnection,
        git: Arc<dyn SourceControl>,
        cache: VersionCache,
        restart: RestartTrigger,
    ) -> Self {
        let changelog = ChangelogGenerator::new(repository.clone());
        Self {
            settings,
            repository,
            db,
            git,
            cache,
            changelog,
            restart,
            state: RwLock::new(UpdateState::default()),
        }
    }

    /// Update settings in effect
    #[must_use]
    pub const fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Version and changelog cache
    #[must_use]
    pub const fn cache(&self) -> &VersionCache {
        &self.cache
    }

    /// Copy of the current update state.
    pub async fn state(&self) -> UpdateState {
        self.state.read().await.clone()
    }

    /// Combined update state and cached version info, as served to clients.
    pub async fn status(&self) -> UpdateStatus {
        let state = self.state().await;
        let snapshot = self.cache.snapshot().await;
        UpdateStatus {
            update_pending: state.update_pending,
            restart_at: state.restart_at.map(|at| at.timestamp_millis()),
            update_version: state.update_version,
            current_version: snapshot.current_version,
            last_update_at: snapshot.last_update_at,
            auto_update_show_changelogs: self.settings.show_changelogs,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Result;
    use crate::test_utils::{MockRepo, TestApp};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_status_of_idle_service() -> Result<()> {
        let app = TestApp::new(MockRepo::default()).await?;
        let status = app.service.status().await;

        assert!(!status.update_pending);
        assert_eq!(status.restart_at, None);
        assert_eq!(status.update_version, None);
        assert_eq!(status.current_version, "Unknown");
        assert_eq!(status.last_update_at, None);
        assert!(status.auto_update_show_changelogs);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_serializes_restart_at_as_millis() -> Result<()> {
        let app = TestApp::new(MockRepo::default()).await?;
        {
            let mut state = app.service.state.write().await;
            state.update_pending = true;
            state.restart_at = Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap());
            state.update_version = Some("1.1".to_string());
        }

        let json = serde_json::to_value(app.service.status().await)?;
        assert_eq!(json["updatePending"], true);
        assert_eq!(json["restartAt"], 1_700_000_000_123_i64);
        assert_eq!(json["updateVersion"], "1.1");
        assert_eq!(json["currentVersion"], "Unknown");
        assert!(json["lastUpdateAt"].is_null());
        assert_eq!(json["autoUpdateShowChangelogs"], true);
        Ok(())
    }
}
