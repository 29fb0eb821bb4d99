//! Git branch, worktree and publishing workflow.
//!
//! All git work runs as shell commands inside the sandbox session. The
//! [`GitWorkflow`] borrows the session and the agent's settings for the
//! duration of one operation.

mod branch;
mod diff;
mod push;
mod worktree;

pub use branch::{
    apply_branch_prefix, escape_double_quoted, extract_commit_sha, sanitize_branch_name,
};
pub use diff::{select_diff, DiffSource, SelectedDiff, WorkingTreeStatus};
pub use push::{PushOutcome, PushRequest};
pub use worktree::GitWorktreeContext;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{TimeoutConfig, WorktreeConfig};
use crate::error::{Error, Result};
use crate::events::UpdateSink;
use crate::runner::shell_quote;
use crate::sandbox::{CommandOutput, RunOptions, SandboxSession};

/// Repository state selected for a branch-scoped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// No branch action is taken.
    NotAGitRepo,
    /// The branch is checked out in the working directory.
    GitRepoNoWorktree,
    /// The branch lives in its own worktree.
    GitRepoWorktree,
}

/// Outcome of resolving a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchResolution {
    pub state: RepoState,
    /// Directory the command should run in.
    pub active_dir: PathBuf,
    pub worktree: Option<GitWorktreeContext>,
}

pub(crate) fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Git operations against one sandbox working directory.
pub struct GitWorkflow<'a> {
    session: &'a dyn SandboxSession,
    working_dir: &'a Path,
    timeouts: &'a TimeoutConfig,
    updates: &'a UpdateSink,
}

impl<'a> GitWorkflow<'a> {
    pub fn new(
        session: &'a dyn SandboxSession,
        working_dir: &'a Path,
        timeouts: &'a TimeoutConfig,
        updates: &'a UpdateSink,
    ) -> Self {
        Self {
            session,
            working_dir,
            timeouts,
            updates,
        }
    }

    pub fn working_dir(&self) -> &Path {
        self.working_dir
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        self.timeouts
    }

    /// Runs `command` from `dir`. Non-zero exits are returned, not raised.
    pub(crate) async fn run_in(
        &self,
        dir: &Path,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let full = format!("cd {} && {}", quote_path(dir), command);
        tracing::debug!(command = %full, "running git step");
        self.session
            .run(&full, RunOptions::new(timeout))
            .await
            .map_err(|e| match e {
                Error::Sandbox(msg) => Error::Sandbox(format!("`{}` failed: {}", command, msg)),
                other => other,
            })
    }

    /// Runs `command` from `dir`, turning a non-zero exit into [`Error::Git`].
    pub(crate) async fn run_checked(
        &self,
        dir: &Path,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let output = self.run_in(dir, command, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Git(format!(
                "`{}` exited with {}: {}",
                command,
                output.exit_code,
                output.stderr.trim()
            )))
        }
    }

    /// True when the working directory has a `.git` entry.
    pub async fn is_repository(&self) -> Result<bool> {
        let output = self
            .run_in(self.working_dir, "test -e .git", self.timeouts.probe())
            .await?;
        Ok(output.success())
    }

    /// Prepares `branch` for a command run.
    ///
    /// A working directory that is not a repository (or cannot be probed)
    /// yields [`RepoState::NotAGitRepo`] and the base directory; it is not an
    /// error. Worktree mode is chosen by configuration alone.
    pub async fn resolve_branch(
        &self,
        branch: &str,
        config: &WorktreeConfig,
    ) -> Result<BranchResolution> {
        let is_repo = match self.is_repository().await {
            Ok(is_repo) => is_repo,
            Err(e) => {
                tracing::warn!(error = %e, "could not probe for git repository");
                false
            }
        };

        if !is_repo {
            tracing::info!(
                working_dir = ?self.working_dir,
                branch = %branch,
                "not a git repository, skipping branch setup"
            );
            self.updates
                .git(format!(
                    "{} is not a git repository, skipping branch {}",
                    self.working_dir.display(),
                    branch
                ))
                .await;
            return Ok(BranchResolution {
                state: RepoState::NotAGitRepo,
                active_dir: self.working_dir.to_path_buf(),
                worktree: None,
            });
        }

        if config.enabled {
            let context = GitWorktreeContext::new(branch, self.working_dir, config);
            self.prepare_worktree(&context).await?;
            return Ok(BranchResolution {
                state: RepoState::GitRepoWorktree,
                active_dir: context.path.clone(),
                worktree: Some(context),
            });
        }

        self.checkout_or_create(self.working_dir, branch, true)
            .await?;
        Ok(BranchResolution {
            state: RepoState::GitRepoNoWorktree,
            active_dir: self.working_dir.to_path_buf(),
            worktree: None,
        })
    }
}
