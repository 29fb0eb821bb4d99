//! Working-tree status and diff selection.
//!
//! Both the push and pull request flows pick their diff with the same
//! precedence: the working-tree diff restricted to added, copied, modified and
//! renamed paths, then the full diff against `HEAD`. Pull requests add one
//! more step that stages untracked files and reads the cached diff.

use std::path::Path;

use crate::error::Result;
use crate::runner::shell_quote;

use super::GitWorkflow;

/// Porcelain status plus untracked files of a checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    pub porcelain: String,
    pub untracked: Vec<String>,
}

impl WorkingTreeStatus {
    /// True when there is nothing to commit.
    pub fn is_clean(&self) -> bool {
        self.porcelain.trim().is_empty() && self.untracked.is_empty()
    }
}

/// Which computation produced a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSource {
    /// `git diff --diff-filter=ACMR`
    Filtered,
    /// `git diff HEAD`
    Head,
    /// `git diff --cached` after staging untracked files.
    StagedUntracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDiff {
    pub source: DiffSource,
    pub content: String,
}

/// Picks the first non-empty candidate in precedence order.
pub fn select_diff(
    filtered: &str,
    head: &str,
    staged_untracked: Option<&str>,
) -> Option<SelectedDiff> {
    [
        (DiffSource::Filtered, Some(filtered)),
        (DiffSource::Head, Some(head)),
        (DiffSource::StagedUntracked, staged_untracked),
    ]
    .into_iter()
    .find_map(|(source, content)| {
        content
            .filter(|c| !c.trim().is_empty())
            .map(|c| SelectedDiff {
                source,
                content: c.to_string(),
            })
    })
}

impl GitWorkflow<'_> {
    /// Reads `git status --porcelain` and the untracked file list.
    pub async fn status(&self, dir: &Path) -> Result<WorkingTreeStatus> {
        let porcelain = self
            .run_checked(dir, "git status --porcelain", self.timeouts.probe())
            .await?;
        let untracked = self.untracked_files(dir).await?;

        Ok(WorkingTreeStatus {
            porcelain: porcelain.stdout,
            untracked,
        })
    }

    pub async fn untracked_files(&self, dir: &Path) -> Result<Vec<String>> {
        let output = self
            .run_checked(
                dir,
                "git ls-files --others --exclude-standard",
                self.timeouts.probe(),
            )
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Filtered working diff, falling back to the full diff against `HEAD`.
    pub async fn working_diff(&self, dir: &Path) -> Result<Option<SelectedDiff>> {
        let timeout = self.timeouts.worktree();
        let filtered = self
            .run_checked(dir, "git diff --diff-filter=ACMR", timeout)
            .await?;
        if let Some(selected) = select_diff(&filtered.stdout, "", None) {
            return Ok(Some(selected));
        }

        // HEAD may not exist yet in a fresh repository.
        let head = self.run_in(dir, "git diff HEAD", timeout).await?;
        let head_diff = if head.success() { head.stdout } else { String::new() };
        Ok(select_diff("", &head_diff, None))
    }

    /// Stages `files` and returns the cached diff.
    pub async fn stage_untracked_diff(&self, dir: &Path, files: &[String]) -> Result<String> {
        if files.is_empty() {
            return Ok(String::new());
        }
        let quoted: Vec<String> = files.iter().map(|f| shell_quote(f)).collect();
        self.run_checked(
            dir,
            &format!("git add -- {}", quoted.join(" ")),
            self.timeouts.worktree(),
        )
        .await?;

        let cached = self
            .run_checked(dir, "git diff --cached", self.timeouts.worktree())
            .await?;
        Ok(cached.stdout)
    }
}
