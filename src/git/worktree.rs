//! Git worktree isolation for branch-scoped work.

use std::path::{Path, PathBuf};

use crate::config::WorktreeConfig;
use crate::error::{Error, Result};
use crate::runner::shell_quote;

use super::branch::sanitize_branch_name;
use super::{quote_path, GitWorkflow};

/// Base ref new worktree branches are created from.
const WORKTREE_BASE_REF: &str = "origin/main";

/// Where a branch lives when worktrees are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitWorktreeContext {
    /// Branch checked out in the worktree, as given by the caller.
    pub branch: String,
    /// Sanitized branch name used as the directory name.
    pub segment: String,
    /// Directory holding all of the agent's worktrees.
    pub root: PathBuf,
    /// `root` joined with `segment`.
    pub path: PathBuf,
    pub enabled: bool,
    /// Remove the worktree after a successful push.
    pub cleanup: bool,
}

impl GitWorktreeContext {
    pub fn new(branch: &str, working_dir: &Path, config: &WorktreeConfig) -> Self {
        let segment = sanitize_branch_name(branch);
        let root = config.root_for(working_dir);
        let path = root.join(&segment);
        Self {
            branch: branch.to_string(),
            segment,
            root,
            path,
            enabled: config.enabled,
            cleanup: config.cleanup,
        }
    }
}

impl GitWorkflow<'_> {
    /// Makes `context.path` a worktree with `context.branch` checked out.
    ///
    /// The branch is created (or reset) from `origin/main`; when that fails an
    /// existing local branch is attached instead. A path that already exists
    /// is reused as-is.
    pub async fn prepare_worktree(&self, context: &GitWorktreeContext) -> Result<()> {
        let repo = self.working_dir;
        let path = quote_path(&context.path);
        let branch = shell_quote(&context.branch);

        let existing = self
            .run_in(repo, &format!("test -d {}", path), self.timeouts.probe())
            .await?;
        if existing.success() {
            tracing::info!(path = ?context.path, branch = %context.branch, "reusing worktree");
            self.updates
                .git(format!("Reusing worktree at {}", context.path.display()))
                .await;
            return Ok(());
        }

        self.run_in(
            repo,
            &format!("mkdir -p {}", quote_path(&context.root)),
            self.timeouts.setup(),
        )
        .await?;

        self.updates.git("Fetching remotes").await;
        let fetch = self
            .run_in(repo, "git fetch --all", self.timeouts.worktree())
            .await?;
        if !fetch.success() {
            tracing::warn!(stderr = %fetch.stderr.trim(), "git fetch --all failed");
        }

        self.updates
            .git(format!(
                "Creating worktree for {} at {}",
                context.branch,
                context.path.display()
            ))
            .await;
        let created = self
            .run_in(
                repo,
                &format!(
                    "git worktree add -B {} {} {}",
                    branch, path, WORKTREE_BASE_REF
                ),
                self.timeouts.worktree(),
            )
            .await?;
        if created.success() {
            tracing::info!(path = ?context.path, branch = %context.branch, "created worktree");
            return Ok(());
        }

        tracing::debug!(
            stderr = %created.stderr.trim(),
            "worktree from {} failed, attaching existing branch",
            WORKTREE_BASE_REF
        );
        self.updates
            .git(format!("Attaching existing branch {} to worktree", context.branch))
            .await;
        let attached = self
            .run_in(
                repo,
                &format!("git worktree add {} {}", path, branch),
                self.timeouts.worktree(),
            )
            .await?;
        if !attached.success() {
            return Err(Error::Git(format!(
                "failed to create worktree for {}: {}",
                context.branch,
                attached.stderr.trim()
            )));
        }

        tracing::info!(path = ?context.path, branch = %context.branch, "attached worktree");
        Ok(())
    }

    /// Fails with [`Error::Git`] unless `context.path` exists.
    pub async fn require_worktree(&self, context: &GitWorktreeContext) -> Result<()> {
        let existing = self
            .run_in(
                self.working_dir,
                &format!("test -d {}", quote_path(&context.path)),
                self.timeouts.probe(),
            )
            .await?;
        if existing.success() {
            return Ok(());
        }
        Err(Error::Git(format!(
            "no worktree for branch {} at {}; run a command on the branch first",
            context.branch,
            context.path.display()
        )))
    }

    /// Removes the worktree at `context.path`.
    pub async fn remove_worktree(&self, context: &GitWorktreeContext) -> Result<()> {
        self.run_checked(
            self.working_dir,
            &format!("git worktree remove --force {}", quote_path(&context.path)),
            self.timeouts.worktree(),
        )
        .await?;
        tracing::info!(path = ?context.path, "removed worktree");
        Ok(())
    }
}
