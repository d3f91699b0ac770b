use super::UpdateState;
use super::service::UpdateService;
use crate::core::system_info;
use crate::errors::Result;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

/// Placeholder for the pre-update head when it cannot be resolved
const CURRENT_HEAD: &str = "HEAD";

/// How the changelog document was changed by an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogWrite {
    /// The version marker changed, so the document now holds only the new entries
    Replaced,
    /// New entries were added after the existing content
    Appended,
    /// Nothing to add
    Unchanged,
}

/// Result of one apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The pull failed. The remote revision is recorded as known-bad and the
    /// server keeps running the old code.
    Failed {
        /// Revision that was pending, if any
        remote_revision: Option<String>,
    },
    /// The pull succeeded and the restart trigger was invoked. Only observed
    /// when the trigger's exit hook returns.
    Restarting {
        /// Changelog handling, `None` if it failed
        changelog: Option<ChangelogWrite>,
        /// Recorded update timestamp, `None` if it could not be stored
        last_update_at: Option<String>,
    },
}

/// Writes `entries` to the changelog document.
///
/// A version bump replaces the document, even with no entries. Otherwise
/// entries are appended, and an empty batch leaves the file alone.
pub async fn write_changelog(
    path: &Path,
    entries: &[String],
    version_changed: bool,
) -> Result<ChangelogWrite> {
    let mut content = entries.join("\n");
    content.push('\n');

    if version_changed {
        tokio::fs::write(path, content).await?;
        return Ok(ChangelogWrite::Replaced);
    }
    if entries.is_empty() {
        return Ok(ChangelogWrite::Unchanged);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(ChangelogWrite::Appended)
}

impl UpdateService {
    /// Pulls the pending update, regenerates changelog entries, records the
    /// update time and hands over to the restart trigger.
    ///
    /// Everything after a successful pull is best-effort: failures are logged
    /// and the restart still happens.
    #[instrument(skip(self))]
    pub async fn apply_update(&self) -> ApplyOutcome {
        info!("Performing git pull from {}...", self.repository.remote_ref());

        let orig_head = match self.git.local_head().await {
            Ok(head) => head,
            Err(e) => {
                error!("Failed to get original head: {}", e);
                CURRENT_HEAD.to_string()
            }
        };

        if let Err(e) = self.git.pull().await {
            error!("Git pull failed: {}", e);
            return self.record_failure().await;
        }

        self.cache.refresh_current_version().await;

        let changelog = match self.regenerate_changelog(&orig_head).await {
            Ok(write) => Some(write),
            Err(e) => {
                error!("Error generating changelogs during update: {}", e);
                None
            }
        };
        self.cache.refresh_changelog().await;

        let last_update_at = match system_info::record_update_now(&self.db).await {
            Ok(now) => {
                self.cache.refresh_last_update_at(&self.db).await;
                Some(now)
            }
            Err(e) => {
                error!("Failed to update last_update_at in database: {}", e);
                None
            }
        };

        *self.state.write().await = UpdateState::default();
        self.restart.trigger();

        ApplyOutcome::Restarting {
            changelog,
            last_update_at,
        }
    }

    async fn regenerate_changelog(&self, orig_head: &str) -> Result<ChangelogWrite> {
        let changed = self.git.changed_paths(orig_head, CURRENT_HEAD).await?;
        let version_changed = changed.iter().any(|p| *p == self.repository.version_file);

        let revisions = self.git.revisions_between(orig_head, CURRENT_HEAD).await?;
        let mut entries = Vec::with_capacity(revisions.len());
        for revision in &revisions {
            let entry = self.changelog.generate_entry(self.git.as_ref(), revision).await;
            if !entry.is_empty() {
                entries.push(entry);
            }
        }

        let write = write_changelog(self.cache.changelog_path(), &entries, version_changed).await?;
        info!(
            "Changelog {:?} with {} entries from {} revisions",
            write,
            entries.len(),
            revisions.len()
        );
        Ok(write)
    }

    /// Marks the pending remote revision as known-bad and clears the pending state.
    async fn record_failure(&self) -> ApplyOutcome {
        let remote_revision = {
            let mut state = self.state.write().await;
            std::mem::take(&mut *state).pending_remote_revision
        };

        if let Some(revision) = &remote_revision {
            if let Err(e) = system_info::record_failed_remote_revision(&self.db, revision).await {
                error!("Failed to store failed remote revision: {}", e);
            }
        }

        ApplyOutcome::Failed { remote_revision }
    }
}
