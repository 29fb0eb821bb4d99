//! Pull request publishing.
//!
//! Turns the agent's uncommitted changes into a branch, a commit and a GitHub
//! pull request, then makes sure the agent's label is attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::UpdateSink;
use crate::git::{
    apply_branch_prefix, escape_double_quoted, extract_commit_sha, select_diff, GitWorkflow,
    SelectedDiff,
};
use crate::github::{
    GitHubApi, GitHubPullRequest, LabelOptions, MergeOptions, MergeResult, NewPullRequest,
    RepoSlug, RestGitHub,
};
use crate::pipeline::CodingAgent;
use crate::runner::{shell_quote, AgentProfile, ModelConfig};
use crate::summarizer::{MetadataSummarizer, PullRequestDraft};

/// Base branch used when the current branch cannot be determined.
const DEFAULT_BASE_BRANCH: &str = "main";

/// Caller overrides for [`CodingAgent::create_pull_request`].
#[derive(Debug, Clone, Default)]
pub struct PullRequestOptions {
    /// `owner/repo`; defaults to the configured repository.
    pub repository: Option<String>,
    /// Takes precedence over the configured label.
    pub label: Option<LabelOptions>,
    /// Prepended to the generated branch name.
    pub branch_prefix: Option<String>,
}

impl PullRequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_label(mut self, label: LabelOptions) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = Some(prefix.into());
        self
    }
}

/// A created pull request plus the locally computed branch and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestResult {
    /// GitHub's global id for the pull request.
    pub id: u64,
    /// Number within the repository.
    pub number: u64,
    /// `open` or `closed`.
    pub state: String,
    /// Browser URL of the pull request.
    pub html_url: String,
    pub title: String,
    /// Branch the changes were pushed to.
    pub head_ref: String,
    /// Branch the pull request targets.
    pub base_ref: String,
    /// Login of the account that opened it.
    pub author: Option<String>,
    /// False when GitHub leaves it out.
    pub merged: bool,
    /// `None` while GitHub is still computing mergeability.
    pub mergeable: Option<bool>,
    /// Local branch created for the commit, prefix included.
    pub branch_name: String,
    /// Short SHA parsed from `git commit` output, if it printed one.
    pub commit_sha: Option<String>,
}

impl PullRequestResult {
    fn from_github(pr: GitHubPullRequest, branch_name: String, commit_sha: Option<String>) -> Self {
        Self {
            id: pr.id,
            number: pr.number,
            state: pr.state,
            html_url: pr.html_url,
            title: pr.title,
            head_ref: pr.head.ref_name,
            base_ref: pr.base.ref_name,
            author: pr.user.map(|u| u.login),
            merged: pr.merged.unwrap_or(false),
            mergeable: pr.mergeable,
            branch_name,
            commit_sha,
        }
    }
}

/// Publishes one pull request from a checkout inside the sandbox.
pub struct PullRequestPublisher<'a> {
    git: GitWorkflow<'a>,
    github: &'a dyn GitHubApi,
    summarizer: &'a dyn MetadataSummarizer,
    repo: &'a RepoSlug,
}

impl<'a> PullRequestPublisher<'a> {
    pub fn new(
        git: GitWorkflow<'a>,
        github: &'a dyn GitHubApi,
        summarizer: &'a dyn MetadataSummarizer,
        repo: &'a RepoSlug,
    ) -> Self {
        Self {
            git,
            github,
            summarizer,
            repo,
        }
    }

    /// Reads the branch checked out in `dir`, before anything is created.
    pub async fn base_branch(&self, dir: &Path) -> String {
        match self.git.current_branch(dir).await {
            Ok(branch) if !branch.is_empty() && branch != "HEAD" => branch,
            Ok(_) => DEFAULT_BASE_BRANCH.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read current branch, using {}", DEFAULT_BASE_BRANCH);
                DEFAULT_BASE_BRANCH.to_string()
            }
        }
    }

    /// Filtered diff, then `HEAD` diff, then the cached diff after staging
    /// untracked files.
    pub async fn collect_diff(&self, dir: &Path) -> Result<SelectedDiff> {
        if let Some(selected) = self.git.working_diff(dir).await? {
            return Ok(selected);
        }

        let untracked = self.git.untracked_files(dir).await?;
        if !untracked.is_empty() {
            let staged = self.git.stage_untracked_diff(dir, &untracked).await?;
            if let Some(selected) = select_diff("", "", Some(&staged)) {
                return Ok(selected);
            }
        }

        Err(Error::NoChanges(format!(
            "no diff content in {}",
            dir.display()
        )))
    }

    /// Runs the whole flow: diff, metadata, branch, commit, push, PR, label.
    pub async fn publish(
        &self,
        dir: &Path,
        model: &ModelConfig,
        prompt: Option<&str>,
        branch_prefix: Option<&str>,
        label: &LabelOptions,
    ) -> Result<PullRequestResult> {
        let base = self.base_branch(dir).await;

        let diff = self.collect_diff(dir).await?;
        let metadata = self
            .summarizer
            .generate_pr_metadata(&diff.content, model, prompt)
            .await?;
        let draft = PullRequestDraft::new(metadata, diff.content);
        tracing::info!(
            source = ?diff.source,
            bytes = draft.diff.len(),
            files = draft.changed_files(),
            title = %draft.title,
            "drafted pull request"
        );
        let branch = apply_branch_prefix(branch_prefix, &draft.branch_name);

        let committed = self
            .git
            .run_checked(
                dir,
                &format!(
                    "git checkout -b {} && git add -A && git commit -m \"{}\"",
                    shell_quote(&branch),
                    escape_double_quoted(&draft.commit_message)
                ),
                self.git_timeout(),
            )
            .await?;
        let commit_sha = extract_commit_sha(&committed.stdout);
        tracing::info!(branch = %branch, sha = ?commit_sha, "committed changes");

        self.git.push_branch(dir, &branch).await?;

        let pr = self
            .github
            .create_pull_request(
                self.repo,
                &NewPullRequest {
                    title: draft.title,
                    body: draft.body,
                    head: branch.clone(),
                    base,
                },
            )
            .await?;
        tracing::info!(repo = %self.repo, number = pr.number, url = %pr.html_url, "created pull request");

        if let Err(e) = self.ensure_label(pr.number, label).await {
            tracing::warn!(error = %e, label = %label.name, number = pr.number, "failed to label pull request");
        }

        Ok(PullRequestResult::from_github(pr, branch, commit_sha))
    }

    /// Creates `label` if the lookup finds nothing, then attaches it.
    pub async fn ensure_label(&self, number: u64, label: &LabelOptions) -> Result<()> {
        if self.github.get_label(self.repo, &label.name).await?.is_none() {
            self.github.create_label(self.repo, label).await?;
            tracing::info!(label = %label.name, "created label");
        }
        self.github
            .add_labels(self.repo, number, &[label.name.clone()])
            .await
    }

    fn git_timeout(&self) -> std::time::Duration {
        self.git.timeouts().command()
    }
}

impl CodingAgent {
    fn github_target(&self, repository: Option<&str>) -> Result<(Arc<dyn GitHubApi>, RepoSlug)> {
        let config = self
            .config
            .github
            .as_ref()
            .filter(|github| !github.token.trim().is_empty())
            .ok_or_else(|| Error::Config("no GitHub token configured".to_string()))?;

        let repository = repository
            .or(config.repository.as_deref())
            .ok_or_else(|| Error::Config("no GitHub repository configured".to_string()))?;
        let repo = RepoSlug::parse(repository)
            .ok_or_else(|| Error::Config(format!("invalid repository: {}", repository)))?;

        let client = match &self.github {
            Some(client) => Arc::clone(client),
            None => Arc::new(
                RestGitHub::new(config.token.clone()).with_base_url(config.api_base_url.clone()),
            ) as Arc<dyn GitHubApi>,
        };
        Ok((client, repo))
    }

    /// Directory holding the current branch's changes.
    async fn publish_dir(&self, git: &GitWorkflow<'_>) -> Result<PathBuf> {
        let worktree = match self.current_branch.as_deref() {
            Some(branch) => self.locate_worktree(git, branch).await?,
            None => None,
        };
        Ok(worktree
            .map(|context| context.path)
            .unwrap_or_else(|| self.config.working_directory.clone()))
    }

    /// Opens a pull request from the agent's uncommitted changes.
    ///
    /// Fails before touching the sandbox when the token, repository or
    /// summarizer is missing, and before any GitHub call when there is no
    /// diff. Label failures are logged; the pull request is still returned.
    pub async fn create_pull_request(
        &mut self,
        options: PullRequestOptions,
    ) -> Result<PullRequestResult> {
        let (github, repo) = self.github_target(options.repository.as_deref())?;
        let summarizer = self.require_summarizer()?;
        let session = self.get_sandbox().await?;

        let label = options
            .label
            .or_else(|| {
                self.config
                    .github
                    .as_ref()
                    .and_then(|github| github.label.clone())
            })
            .unwrap_or_else(|| {
                let command = self.runner.command_config("", Default::default());
                LabelOptions::for_agent(self.runner.agent_type(), &command.label_name)
            });
        let model = self.runner.model_config();
        let updates = UpdateSink::none();

        let result = {
            let git = GitWorkflow::new(
                session.as_ref(),
                &self.config.working_directory,
                &self.config.timeouts,
                &updates,
            );
            let dir = self.publish_dir(&git).await?;
            PullRequestPublisher::new(git, github.as_ref(), summarizer.as_ref(), &repo)
                .publish(
                    &dir,
                    &model,
                    self.last_prompt.as_deref(),
                    options.branch_prefix.as_deref(),
                    &label,
                )
                .await?
        };

        self.current_branch = Some(result.branch_name.clone());
        Ok(result)
    }

    /// Merges pull request `number` in the configured repository.
    pub async fn merge_pull_request(
        &self,
        number: u64,
        options: &MergeOptions,
    ) -> Result<MergeResult> {
        let (github, repo) = self.github_target(None)?;
        let result = github.merge_pull_request(&repo, number, options).await?;
        tracing::info!(repo = %repo, number, merged = result.merged, "merge requested");
        Ok(result)
    }
}
