//! Self-update subsystem
//!
//! A periodic checker compares the local and remote heads of the tracked
//! branch. When they differ it marks an update pending and, after a wait
//! window, the applier pulls the new code, regenerates changelog entries,
//! records the update durably and hands over to the restart trigger.
//!
//! All mutable update state lives in one [`UpdateState`] owned by the
//! [`UpdateService`]. `update_pending` gates the checker: once set, checks are
//! no-ops until the applier clears it (failure) or the process restarts
//! (success). The gate is per process; replicas sharing one database are not
//! coordinated.

/// Apply step: pull, changelog, bookkeeping, restart
pub mod applier;
/// Changelog entry generation
pub mod changelog;
/// Check step: detect a newer remote head
pub mod checker;
/// Source-control access
pub mod git;
/// Platform restart scripts
pub mod restart;
/// Timer loop driving checks and delayed applies
pub mod scheduler;
/// Service owning the update state
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use applier::ApplyOutcome;
pub use changelog::ChangelogGenerator;
pub use checker::CheckOutcome;
pub use git::{GitCli, SourceControl};
pub use restart::{RestartStrategy, RestartTrigger};
pub use scheduler::UpdateScheduler;
pub use service::UpdateService;

/// Process-wide update state. Reset to the default on every start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateState {
    /// An update was detected and is waiting to be applied
    pub update_pending: bool,
    /// When the pending update will be applied
    pub restart_at: Option<DateTime<Utc>>,
    /// Human-readable version of the pending update
    pub update_version: Option<String>,
    /// Remote head the pending update will move to
    pub pending_remote_revision: Option<String>,
}

/// Body of the update status endpoint, also decoded by the poller client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    /// An update is pending
    pub update_pending: bool,
    /// Restart time in milliseconds since the Unix epoch
    pub restart_at: Option<i64>,
    /// Version of the pending update
    pub update_version: Option<String>,
    /// Version currently installed
    pub current_version: String,
    /// ISO-8601 timestamp of the last successful update
    pub last_update_at: Option<String>,
    /// Whether non-admin users may read changelogs
    pub auto_update_show_changelogs: bool,
}
