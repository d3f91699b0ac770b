//! Source-control access for the update subsystem.
//!
//! [`SourceControl`] is the seam between the update logic and the working
//! tree. [`GitCli`] drives the `git` binary through `tokio::process`, always
//! with an explicit argument vector so no shell ever sees the arguments.

use crate::config::RepositoryConfig;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, trace};

/// Operations the checker, applier and changelog generator need from the
/// version-control system.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Fetches the tracked branch from the remote.
    async fn fetch(&self) -> Result<()>;

    /// Revision currently checked out.
    async fn local_head(&self) -> Result<String>;

    /// Latest fetched revision of the tracked remote branch.
    async fn remote_head(&self) -> Result<String>;

    /// Contents of `path` at the remote head.
    async fn show_remote_file(&self, path: &str) -> Result<String>;

    /// Merges the remote branch into the working tree.
    async fn pull(&self) -> Result<()>;

    /// Paths that differ between two revisions.
    async fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<String>>;

    /// Revisions reachable from `to` but not `from`, oldest first.
    async fn revisions_between(&self, from: &str, to: &str) -> Result<Vec<String>>;

    /// Subject line followed by the body of a commit.
    async fn commit_message(&self, revision: &str) -> Result<String>;

    /// Paths touched by a single commit.
    async fn files_in_revision(&self, revision: &str) -> Result<Vec<String>>;

    /// Diff of one file between a commit and its parent.
    async fn file_diff(&self, revision: &str, path: &str) -> Result<String>;
}

/// [`SourceControl`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_dir: PathBuf,
    remote: String,
    branch: String,
}

impl GitCli {
    /// Creates a client operating on the working tree at `work_dir`.
    #[must_use]
    pub fn new(work_dir: PathBuf, repository: &RepositoryConfig) -> Self {
        Self {
            work_dir,
            remote: repository.remote.clone(),
            branch: repository.branch.clone(),
        }
    }

    fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let subcommand = args.first().copied().unwrap_or_default().to_string();
        trace!("git {}", args.join(" "));

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .map_err(|e| Error::Git {
                command: subcommand.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::Git {
                command: subcommand,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SourceControl for GitCli {
    async fn fetch(&self) -> Result<()> {
        self.run(&["fetch", &self.remote, &self.branch]).await?;
        debug!("Fetched {}", self.remote_ref());
        Ok(())
    }

    async fn local_head(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    async fn remote_head(&self) -> Result<String> {
        let remote_ref = self.remote_ref();
        Ok(self.run(&["rev-parse", &remote_ref]).await?.trim().to_string())
    }

    async fn show_remote_file(&self, path: &str) -> Result<String> {
        let object = format!("{}:{path}", self.remote_ref());
        self.run(&["show", &object]).await
    }

    async fn pull(&self) -> Result<()> {
        self.run(&["pull", &self.remote, &self.branch]).await?;
        Ok(())
    }

    async fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let output = self.run(&["diff", "--name-only", from, to]).await?;
        Ok(non_empty_lines(&output))
    }

    async fn revisions_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let range = format!("{from}..{to}");
        let output = self
            .run(&["log", &range, "--reverse", "--pretty=format:%H"])
            .await?;
        Ok(non_empty_lines(&output))
    }

    async fn commit_message(&self, revision: &str) -> Result<String> {
        self.run(&["show", "-s", "--format=%s%n%b", revision]).await
    }

    async fn files_in_revision(&self, revision: &str) -> Result<Vec<String>> {
        let output = self
            .run(&["diff-tree", "--no-commit-id", "--name-only", "-r", revision])
            .await?;
        Ok(non_empty_lines(&output))
    }

    async fn file_diff(&self, revision: &str, path: &str) -> Result<String> {
        let parent = format!("{revision}^");
        self.run(&["diff", &parent, revision, "--", path]).await
    }
}
