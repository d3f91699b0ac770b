//! Repository configuration loading from config.toml
//!
//! The `[repository]` section tells the update subsystem which remote branch to
//! track, where the hosting UI lives (for changelog links), and which files in
//! the working tree hold the version marker and the changelog document.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Structure of the whole config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Source-control settings
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Source-control settings for the self-update subsystem
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Name of the tracked remote
    pub remote: String,
    /// Name of the tracked branch on that remote
    pub branch: String,
    /// Base URL of the hosting UI, e.g. `https://github.com/owner/repo`
    pub web_url: String,
    /// Number of diff lines kept per changed file in a changelog entry
    pub diff_lines: usize,
    /// Version marker file, relative to the working tree
    pub version_file: String,
    /// Changelog document, relative to the working tree
    pub changelog_file: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            web_url: "https://github.com/Oxygen-Low/Local.LLM".to_string(),
            diff_lines: 20,
            version_file: "version.txt".to_string(),
            changelog_file: "changelogs.md".to_string(),
        }
    }
}

impl RepositoryConfig {
    /// The remote-tracking ref, e.g. `origin/main`
    #[must_use]
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Link to a single commit on the hosting UI
    #[must_use]
    pub fn commit_url(&self, revision: &str) -> String {
        format!("{}/commit/{revision}", self.web_url.trim_end_matches('/'))
    }

    /// Link to a pull request on the hosting UI
    #[must_use]
    pub fn pull_request_url(&self, number: &str) -> String {
        format!("{}/pull/{number}", self.web_url.trim_end_matches('/'))
    }
}

/// Loads the TOML configuration file at `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}
