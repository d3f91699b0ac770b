//! Shared test utilities.
//!
//! Provides an in-memory database, a scripted [`SourceControl`], a restart
//! strategy that records launches instead of spawning, and [`TestApp`], a
//! fully wired [`UpdateService`] over a temporary working tree.

#![allow(clippy::unwrap_used, missing_docs)]

use crate::{
    cache::VersionCache,
    config::{RepositoryConfig, UpdateSettings},
    core::users::PasswordHasher,
    errors::{Error, Result},
    update::{
        RestartStrategy, RestartTrigger, SourceControl, UpdateService, restart::ExitHook,
    },
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Secret used by every test hasher
pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-characters";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all database tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Password hasher keyed by [`TEST_SECRET`].
pub fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(TEST_SECRET).unwrap()
}

/// One scripted commit
#[derive(Debug, Clone, Default)]
pub struct MockCommit {
    /// Subject line, optionally followed by a body
    pub message: String,
    /// Changed paths with their diff, `None` when the diff is unavailable
    pub files: Vec<(String, Option<String>)>,
}

/// Scripted repository state behind [`MockSourceControl`].
#[derive(Debug, Clone, Default)]
pub struct MockRepo {
    pub local_head: String,
    pub remote_head: String,
    pub fail_fetch: bool,
    pub fail_local_head: bool,
    pub fail_remote_head: bool,
    pub fail_pull: bool,
    pub fail_changed_paths: bool,
    /// Files readable at the remote head
    pub remote_files: HashMap<String, String>,
    pub commits: HashMap<String, MockCommit>,
    /// Returned by `revisions_between`
    pub new_revisions: Vec<String>,
    /// Returned by `changed_paths`
    pub changed_paths: Vec<String>,
    /// Written into the working tree by a successful pull
    pub pulled_files: Vec<(PathBuf, String)>,
    /// `(from, to)` of every range query
    pub requested_ranges: Vec<(String, String)>,
    /// Method names in call order
    pub calls: Vec<String>,
}

/// In-memory [`SourceControl`] driven by a [`MockRepo`].
#[derive(Debug, Default)]
pub struct MockSourceControl {
    repo: Mutex<MockRepo>,
    work_dir: Option<PathBuf>,
}

fn mock_error(command: &str) -> Error {
    Error::Git {
        command: command.to_string(),
        message: "scripted failure".to_string(),
    }
}

impl MockSourceControl {
    pub fn new(repo: MockRepo) -> Self {
        Self {
            repo: Mutex::new(repo),
            work_dir: None,
        }
    }

    /// Pulls write `pulled_files` relative to `dir`.
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.work_dir = Some(dir.to_path_buf());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.repo.lock().unwrap().calls.clone()
    }

    /// Runs `f` against the scripted state.
    pub fn with<T>(&self, f: impl FnOnce(&mut MockRepo) -> T) -> T {
        f(&mut self.repo.lock().unwrap())
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, MockRepo> {
        let mut repo = self.repo.lock().unwrap();
        repo.calls.push(call.to_string());
        repo
    }
}

#[async_trait]
impl SourceControl for MockSourceControl {
    async fn fetch(&self) -> Result<()> {
        let repo = self.record("fetch");
        if repo.fail_fetch {
            return Err(mock_error("fetch"));
        }
        Ok(())
    }

    async fn local_head(&self) -> Result<String> {
        let repo = self.record("local_head");
        if repo.fail_local_head {
            return Err(mock_error("rev-parse"));
        }
        Ok(repo.local_head.clone())
    }

    async fn remote_head(&self) -> Result<String> {
        let repo = self.record("remote_head");
        if repo.fail_remote_head {
            return Err(mock_error("rev-parse"));
        }
        Ok(repo.remote_head.clone())
    }

    async fn show_remote_file(&self, path: &str) -> Result<String> {
        let repo = self.record("show_remote_file");
        repo.remote_files
            .get(path)
            .cloned()
            .ok_or_else(|| mock_error("show"))
    }

    async fn pull(&self) -> Result<()> {
        let mut repo = self.record("pull");
        if repo.fail_pull {
            return Err(mock_error("pull"));
        }
        repo.local_head = repo.remote_head.clone();
        if let Some(dir) = &self.work_dir {
            for (path, contents) in &repo.pulled_files {
                std::fs::write(dir.join(path), contents)?;
            }
        }
        Ok(())
    }

    async fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let mut repo = self.record("changed_paths");
        repo.requested_ranges.push((from.to_string(), to.to_string()));
        if repo.fail_changed_paths {
            return Err(mock_error("diff"));
        }
        Ok(repo.changed_paths.clone())
    }

    async fn revisions_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let mut repo = self.record("revisions_between");
        repo.requested_ranges.push((from.to_string(), to.to_string()));
        Ok(repo.new_revisions.clone())
    }

    async fn commit_message(&self, revision: &str) -> Result<String> {
        let repo = self.record("commit_message");
        repo.commits
            .get(revision)
            .map(|c| c.message.clone())
            .ok_or_else(|| mock_error("show"))
    }

    async fn files_in_revision(&self, revision: &str) -> Result<Vec<String>> {
        let repo = self.record("files_in_revision");
        repo.commits
            .get(revision)
            .map(|c| c.files.iter().map(|(path, _)| path.clone()).collect())
            .ok_or_else(|| mock_error("diff-tree"))
    }

    async fn file_diff(&self, revision: &str, path: &str) -> Result<String> {
        let repo = self.record("file_diff");
        repo.commits
            .get(revision)
            .and_then(|c| c.files.iter().find(|(p, _)| p == path))
            .and_then(|(_, diff)| diff.clone())
            .ok_or_else(|| mock_error("diff"))
    }
}

/// Restart strategy that counts launches instead of spawning.
#[derive(Debug, Clone, Default)]
pub struct RecordingStrategy {
    launches: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingStrategy {
    /// A strategy whose launch always fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.launches)
    }
}

impl RestartStrategy for RecordingStrategy {
    fn script_name(&self) -> &'static str {
        "restart.sh"
    }

    fn launch(&self, _script: &Path, _work_dir: &Path) -> Result<()> {
        if self.fail {
            return Err(std::io::Error::other("scripted spawn failure").into());
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects exit codes passed to a [`RestartTrigger`].
#[derive(Debug, Clone, Default)]
pub struct ExitRecorder {
    codes: Arc<Mutex<Vec<i32>>>,
}

impl ExitRecorder {
    pub fn hook(&self) -> ExitHook {
        let codes = Arc::clone(&self.codes);
        Arc::new(move |code| codes.lock().unwrap().push(code))
    }

    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

/// An [`UpdateService`] wired to a mock repository inside a temp directory.
pub struct TestApp {
    pub dir: TempDir,
    pub db: DatabaseConnection,
    pub git: Arc<MockSourceControl>,
    pub service: Arc<UpdateService>,
    pub exits: ExitRecorder,
    launches: Arc<AtomicUsize>,
}

impl TestApp {
    /// Default update settings
    pub fn settings() -> UpdateSettings {
        UpdateSettings::default()
    }

    pub async fn new(repo: MockRepo) -> Result<Self> {
        Self::with_settings(repo, Self::settings()).await
    }

    /// Tests that need a paused clock call `tokio::time::pause()` after this
    /// returns, so database setup runs on real time.
    pub async fn with_settings(repo: MockRepo, settings: UpdateSettings) -> Result<Self> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let repository = RepositoryConfig::default();
        let git = Arc::new(MockSourceControl::new(repo).in_dir(dir.path()));
        let cache = VersionCache::new(
            dir.path().join(&repository.version_file),
            dir.path().join(&repository.changelog_file),
        );
        let strategy = RecordingStrategy::default();
        let launches = strategy.launches();
        let exits = ExitRecorder::default();
        let restart = RestartTrigger::new(dir.path().to_path_buf(), Box::new(strategy))
            .with_exit(exits.hook());

        let service = Arc::new(UpdateService::new(
            settings,
            repository,
            db.clone(),
            Arc::clone(&git) as Arc<dyn SourceControl>,
            cache,
            restart,
        ));

        Ok(Self {
            dir,
            db,
            git,
            service,
            exits,
            launches,
        })
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        std::fs::write(self.dir.path().join(name), contents)?;
        Ok(())
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.dir.path().join(name))?)
    }

    pub fn write_restart_script(&self) -> Result<()> {
        self.write_file("restart.sh", "#!/bin/bash\n")
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}
