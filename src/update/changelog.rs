//! Changelog entry generation
//!
//! Turns one commit into a self-contained HTML fragment: title, description,
//! commit and pull-request links, and a collapsible block per changed file
//! holding the first few lines of its diff. All commit-derived text is escaped
//! before it is interpolated.

use super::git::SourceControl;
use crate::config::RepositoryConfig;
use crate::errors::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{error, instrument, warn};

#[allow(clippy::expect_used)]
static PULL_REQUEST_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)$").expect("valid pull request pattern"));

/// Escapes `&`, `<`, `>`, `"` and `'` for safe interpolation into markup.
#[must_use]
pub fn escape_html(unsafe_text: &str) -> String {
    let mut escaped = String::with_capacity(unsafe_text.len());
    for c in unsafe_text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Accepts only non-empty strings of hex digits.
pub fn validate_revision(revision: &str) -> Result<()> {
    if !revision.is_empty() && revision.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::InvalidRevision {
            revision: revision.to_string(),
        })
    }
}

/// Pull request number from a trailing `(#123)` in a commit subject.
#[must_use]
pub fn pull_request_number(title: &str) -> Option<&str> {
    PULL_REQUEST_SUFFIX
        .captures(title.trim_end())
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Builds changelog entries for single revisions.
#[derive(Debug, Clone)]
pub struct ChangelogGenerator {
    repository: RepositoryConfig,
}

impl ChangelogGenerator {
    /// Creates a generator linking to the hosting UI in `repository`.
    #[must_use]
    pub const fn new(repository: RepositoryConfig) -> Self {
        Self { repository }
    }

    /// Generates the entry for `revision`.
    ///
    /// Returns an empty string if the revision is malformed (no git command is
    /// run) or if the commit cannot be read. Failures are logged, never raised.
    #[instrument(skip(self, git))]
    pub async fn generate_entry(&self, git: &dyn SourceControl, revision: &str) -> String {
        if let Err(e) = validate_revision(revision) {
            error!("{}", e);
            return String::new();
        }

        match self.render(git, revision).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("Error generating changelog entry for {}: {}", revision, e);
                String::new()
            }
        }
    }

    async fn render(&self, git: &dyn SourceControl, revision: &str) -> Result<String> {
        let message = git.commit_message(revision).await?;
        let message = message.trim();
        let (title, description) = message
            .split_once('\n')
            .map_or((message, ""), |(title, rest)| (title, rest.trim()));

        let files = git.files_in_revision(revision).await?;
        let commit_url = self.repository.commit_url(revision);

        let mut files_html = String::new();
        for file in &files {
            let body = match git.file_diff(revision, file).await {
                Ok(diff) => {
                    let truncated = truncate_lines(&diff, self.repository.diff_lines);
                    format!(
                        "      <pre class=\"changelog-diff\">{}</pre>\n      <a href=\"{commit_url}\" target=\"_blank\">View full file change</a>\n",
                        escape_html(&truncated)
                    )
                }
                Err(e) => {
                    warn!("Diff unavailable for {} in {}: {}", file, revision, e);
                    format!(
                        "      <p class=\"changelog-diff-missing\">Diff unavailable for this file.</p>\n      <a href=\"{commit_url}\" target=\"_blank\">View file in commit</a>\n"
                    )
                }
            };
            files_html.push_str(&format!(
                "    <details class=\"changelog-file\">\n      <summary>{}</summary>\n{body}    </details>\n",
                escape_html(file)
            ));
        }

        let description_html = if description.is_empty() {
            String::new()
        } else {
            format!(
                "  <p class=\"commit-description\">{}</p>\n",
                escape_html(description)
            )
        };

        let pull_request_html = pull_request_number(title).map_or_else(String::new, |number| {
            format!(
                " | <a href=\"{}\" target=\"_blank\">PR #{number}</a>",
                self.repository.pull_request_url(number)
            )
        });

        let short = &revision[..revision.len().min(7)];

        Ok(format!(
            "\n<div class=\"commit-entry\">\n  <h3>{}</h3>\n{description_html}  <div class=\"commit-links\">\n    <a href=\"{commit_url}\" target=\"_blank\">{short}</a>{pull_request_html}\n  </div>\n  <details class=\"commit-files\">\n    <summary>Files changed ({})</summary>\n{files_html}  </details>\n</div>",
            escape_html(title),
            files.len()
        ))
    }
}

fn truncate_lines(text: &str, max_lines: usize) -> String {
    text.split('\n').take(max_lines).collect::<Vec<_>>().join("\n")
}
