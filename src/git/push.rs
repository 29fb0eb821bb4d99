//! Commit and push of agent changes.

use std::path::Path;

use crate::error::{Error, Result};
use crate::runner::{shell_quote, ModelConfig};
use crate::sandbox::CommandOutput;
use crate::summarizer::MetadataSummarizer;

use super::branch::{escape_double_quoted, extract_commit_sha};
use super::{GitWorkflow, GitWorktreeContext};

/// Inputs for [`GitWorkflow::push_changes`].
pub struct PushRequest<'a> {
    pub branch: &'a str,
    /// Directory holding the changes.
    pub dir: &'a Path,
    /// Set when the branch lives in a worktree.
    pub worktree: Option<&'a GitWorktreeContext>,
    pub summarizer: &'a dyn MetadataSummarizer,
    pub model: &'a ModelConfig,
    pub prompt: Option<&'a str>,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub branch: String,
    pub commit_message: String,
    pub commit_sha: Option<String>,
    pub worktree_removed: bool,
}

impl GitWorkflow<'_> {
    /// Stages everything in `dir` and commits it with `message`.
    pub async fn commit_all(&self, dir: &Path, message: &str) -> Result<CommandOutput> {
        self.run_checked(
            dir,
            &format!("git add -A && git commit -m \"{}\"", escape_double_quoted(message)),
            self.timeouts.command(),
        )
        .await
    }

    /// Pushes `branch` to `origin` and sets it as upstream.
    pub async fn push_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run_checked(
            dir,
            &format!("git push -u origin {}", shell_quote(branch)),
            self.timeouts.command(),
        )
        .await?;
        tracing::info!(branch = %branch, "pushed branch");
        Ok(())
    }

    /// Commits pending changes with a synthesized message and pushes them.
    ///
    /// Fails with [`Error::NoChanges`] before any mutating command when the
    /// checkout is clean. A worktree is removed only after a successful push
    /// and only when cleanup is enabled; on failure it is left for inspection.
    pub async fn push_changes(&self, request: PushRequest<'_>) -> Result<PushOutcome> {
        let status = self.status(request.dir).await?;
        if status.is_clean() {
            return Err(Error::NoChanges(format!(
                "nothing to commit on branch {}",
                request.branch
            )));
        }

        if request.worktree.is_none() {
            self.checkout_or_create(request.dir, request.branch, false)
                .await?;
        }

        let diff = self
            .working_diff(request.dir)
            .await?
            .map(|selected| {
                tracing::debug!(source = ?selected.source, "selected diff for commit message");
                selected.content
            })
            .unwrap_or_default();

        let commit = request
            .summarizer
            .generate_commit_message(&diff, request.model, request.prompt)
            .await?;

        let committed = self
            .commit_all(request.dir, &commit.commit_message)
            .await?;
        self.push_branch(request.dir, request.branch).await?;

        let mut worktree_removed = false;
        if let Some(context) = request.worktree {
            if context.cleanup {
                match self.remove_worktree(context).await {
                    Ok(()) => worktree_removed = true,
                    Err(e) => {
                        tracing::warn!(error = %e, path = ?context.path, "failed to remove worktree after push")
                    }
                }
            }
        }

        Ok(PushOutcome {
            branch: request.branch.to_string(),
            commit_message: commit.commit_message,
            commit_sha: extract_commit_sha(&committed.stdout),
            worktree_removed,
        })
    }
}
