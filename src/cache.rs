//! In-memory cache of the installed version, changelog text and last update time.
//!
//! The cache is never authoritative: every field is rebuilt from the version
//! marker file, the changelog document, or the `system_info` table. Refresh
//! failures are logged and leave the previous value in place.

use crate::core::system_info;
use sea_orm::DatabaseConnection;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, trace};

/// Version reported before the marker file has ever been read
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Point-in-time copy of the cached values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSnapshot {
    /// Installed version, from the version marker file
    pub current_version: String,
    /// Full changelog document
    pub changelog_text: String,
    /// ISO-8601 timestamp of the last successful update
    pub last_update_at: Option<String>,
}

impl Default for VersionSnapshot {
    fn default() -> Self {
        Self {
            current_version: UNKNOWN_VERSION.to_string(),
            changelog_text: String::new(),
            last_update_at: None,
        }
    }
}

/// Shared, read-mostly cache refreshed after each update
#[derive(Debug, Clone)]
pub struct VersionCache {
    version_path: PathBuf,
    changelog_path: PathBuf,
    inner: Arc<RwLock<VersionSnapshot>>,
}

impl VersionCache {
    /// Creates an empty cache backed by the given artifact paths.
    #[must_use]
    pub fn new(version_path: PathBuf, changelog_path: PathBuf) -> Self {
        Self {
            version_path,
            changelog_path,
            inner: Arc::new(RwLock::new(VersionSnapshot::default())),
        }
    }

    /// Path of the version marker file
    #[must_use]
    pub fn version_path(&self) -> &Path {
        &self.version_path
    }

    /// Path of the changelog document
    #[must_use]
    pub fn changelog_path(&self) -> &Path {
        &self.changelog_path
    }

    /// Copies the current values.
    pub async fn snapshot(&self) -> VersionSnapshot {
        self.inner.read().await.clone()
    }

    /// Re-reads the version marker file, trimmed to one line.
    ///
    /// A missing file leaves the cached version unchanged.
    pub async fn refresh_current_version(&self) {
        match tokio::fs::read_to_string(&self.version_path).await {
            Ok(data) => {
                let version = data.lines().next().unwrap_or_default().trim().to_string();
                info!("Current version cache refreshed: {}", version);
                self.inner.write().await.current_version = version;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No version marker at {:?}", self.version_path);
            }
            Err(e) => error!("Error refreshing current version cache: {}", e),
        }
    }

    /// Re-reads the changelog document. A missing file empties the cache.
    pub async fn refresh_changelog(&self) {
        match tokio::fs::read_to_string(&self.changelog_path).await {
            Ok(text) => {
                trace!("Changelog cache refreshed with {} bytes", text.len());
                self.inner.write().await.changelog_text = text;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.inner.write().await.changelog_text = String::new();
            }
            Err(e) => error!("Error refreshing changelogs cache: {}", e),
        }
    }

    /// Re-reads the last update timestamp from the durable store.
    pub async fn refresh_last_update_at(&self, db: &DatabaseConnection) {
        match system_info::last_update_at(db).await {
            Ok(value) => self.inner.write().await.last_update_at = value,
            Err(e) => error!("Error refreshing last update at cache: {}", e),
        }
    }

    /// Refreshes every field.
    pub async fn refresh_all(&self, db: &DatabaseConnection) {
        tokio::join!(
            self.refresh_current_version(),
            self.refresh_changelog(),
            self.refresh_last_update_at(db),
        );
    }
}
