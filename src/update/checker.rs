use super::service::UpdateService;
use crate::cache::UNKNOWN_VERSION;
use crate::core::system_info;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info, instrument, warn};

/// Result of one check cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Auto-update is switched off
    Disabled,
    /// An earlier check already scheduled an apply
    AlreadyPending,
    /// Fetch or revision lookup failed; nothing was changed
    RemoteUnavailable,
    /// The remote head is the revision that failed to apply last time
    PreviouslyFailed {
        /// The skipped remote head
        revision: String,
    },
    /// Local and remote heads match
    UpToDate,
    /// A newer remote head was found and the update is now pending
    UpdateAvailable {
        /// Remote head to move to
        remote_revision: String,
        /// Human-readable version of the update
        version: String,
        /// When the apply is due
        restart_at: DateTime<Utc>,
    },
}

fn first_line(text: &str) -> Option<String> {
    let line = text.lines().next().unwrap_or_default().trim();
    (!line.is_empty()).then(|| line.to_string())
}

impl UpdateService {
    /// Compares the local head with the remote head and marks an update
    /// pending when they differ.
    ///
    /// Any fetch or lookup failure aborts the cycle before state is touched.
    /// Scheduling the apply is left to the caller.
    #[instrument(skip(self))]
    pub async fn check_for_updates(&self) -> CheckOutcome {
        if !self.settings.enabled {
            return CheckOutcome::Disabled;
        }
        if self.state.read().await.update_pending {
            return CheckOutcome::AlreadyPending;
        }

        info!("Checking for updates...");
        if let Err(e) = self.git.fetch().await {
            error!("Update check failed: {}", e);
            return CheckOutcome::RemoteUnavailable;
        }

        let (local, remote) = match tokio::try_join!(self.git.local_head(), self.git.remote_head())
        {
            Ok(heads) => heads,
            Err(e) => {
                error!("Update check failed: {}", e);
                return CheckOutcome::RemoteUnavailable;
            }
        };

        match system_info::failed_remote_revision(&self.db).await {
            Ok(Some(failed)) if failed == remote => {
                info!("Skipping update as remote revision {} previously failed.", remote);
                return CheckOutcome::PreviouslyFailed { revision: remote };
            }
            Ok(_) => {}
            Err(e) => error!("Error checking failed remote revision: {}", e),
        }

        if local == remote {
            return CheckOutcome::UpToDate;
        }

        info!("Update detected! Local: {}, Remote: {}", local, remote);
        let version = self.resolve_update_version().await;
        info!("Update Version: {}", version);

        let wait = TimeDelta::from_std(self.settings.wait).unwrap_or(TimeDelta::MAX);
        let restart_at = Utc::now().checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut state = self.state.write().await;
        if state.update_pending {
            return CheckOutcome::AlreadyPending;
        }
        state.update_pending = true;
        state.pending_remote_revision = Some(remote.clone());
        state.restart_at = Some(restart_at);
        state.update_version = Some(version.clone());

        CheckOutcome::UpdateAvailable {
            remote_revision: remote,
            version,
            restart_at,
        }
    }

    /// Version label of the remote head: the version marker file, else the
    /// first line of the changelog document, else `Unknown`.
    ///
    /// A marker file that exists but is blank counts as missing.
    pub async fn resolve_update_version(&self) -> String {
        match self.git.show_remote_file(&self.repository.version_file).await {
            Ok(text) => {
                if let Some(version) = first_line(&text) {
                    return version;
                }
            }
            Err(e) => warn!("No remote version marker: {}", e),
        }

        match self.git.show_remote_file(&self.repository.changelog_file).await {
            Ok(text) => first_line(&text).unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            Err(_) => UNKNOWN_VERSION.to_string(),
        }
    }
}
