//! Branch naming and checkout helpers.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;

use super::GitWorkflow;

/// Matches git's commit summary line, e.g. `[feature/x 1a2b3c4] message`
/// or `[main (root-commit) 1a2b3c4] message`.
static COMMIT_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]\s]+(?: \([^)]*\))? ([0-9a-f]{7,40})\]").expect("valid commit pattern")
});

/// Reduces a branch name to a single filesystem-safe path segment.
///
/// Every character outside `[a-zA-Z0-9._-]` becomes `-`. A result made only
/// of dots is also dashed so it can never name `.` or `..`.
pub fn sanitize_branch_name(branch: &str) -> String {
    let sanitized: String = branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.is_empty() {
        return "-".to_string();
    }
    if sanitized.chars().all(|c| c == '.') {
        return "-".repeat(sanitized.len());
    }
    sanitized
}

/// Joins an optional prefix onto a generated branch name.
pub fn apply_branch_prefix(prefix: Option<&str>, branch: &str) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) if prefix.ends_with('/') => format!("{}{}", prefix, branch),
        Some(prefix) => format!("{}/{}", prefix, branch),
        None => branch.to_string(),
    }
}

/// Escapes text for use inside a double-quoted shell word.
pub fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Pulls the abbreviated commit SHA out of `git commit` output.
pub fn extract_commit_sha(output: &str) -> Option<String> {
    COMMIT_SUMMARY
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl GitWorkflow<'_> {
    /// Checks out `branch` in `dir`, creating it when it does not exist.
    ///
    /// With `notify` set, each step is reported as a `git` update.
    pub async fn checkout_or_create(&self, dir: &Path, branch: &str, notify: bool) -> Result<()> {
        let quoted = crate::runner::shell_quote(branch);
        let timeout = self.timeouts.worktree();

        if notify {
            self.updates.git(format!("Checking out branch {}", branch)).await;
        }
        let checkout = self
            .run_in(dir, &format!("git checkout {}", quoted), timeout)
            .await?;
        if checkout.success() {
            tracing::info!(branch = %branch, "checked out existing branch");
            if notify {
                self.updates.git(format!("Switched to branch {}", branch)).await;
            }
            return Ok(());
        }

        if notify {
            self.updates
                .git(format!("Branch {} not found, creating it", branch))
                .await;
        }
        self.run_checked(dir, &format!("git checkout -b {}", quoted), timeout)
            .await?;
        tracing::info!(branch = %branch, "created branch");
        if notify {
            self.updates
                .git(format!("Created and switched to branch {}", branch))
                .await;
        }
        Ok(())
    }

    /// Returns the branch checked out in `dir`.
    pub async fn current_branch(&self, dir: &Path) -> Result<String> {
        let output = self
            .run_checked(dir, "git rev-parse --abbrev-ref HEAD", self.timeouts.probe())
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
