//! Contract for the model-backed service that writes commit and PR metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::runner::ModelConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub commit_message: String,
}

/// Metadata for a new pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestMetadata {
    pub title: String,
    pub body: String,
    pub branch_name: String,
    pub commit_message: String,
}

/// Everything needed to publish one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    /// Unprefixed branch name suggested by the summarizer.
    pub branch_name: String,
    pub commit_message: String,
    /// The diff the metadata was generated from.
    pub diff: String,
}

impl PullRequestDraft {
    pub fn new(metadata: PullRequestMetadata, diff: String) -> Self {
        Self {
            title: metadata.title,
            body: metadata.body,
            branch_name: metadata.branch_name,
            commit_message: metadata.commit_message,
            diff,
        }
    }

    /// Number of files touched by the diff.
    pub fn changed_files(&self) -> usize {
        self.diff
            .lines()
            .filter(|line| line.starts_with("diff --git "))
            .count()
    }
}

/// Synthesizes commit messages and pull request metadata from a diff.
///
/// Failures are returned as-is to the caller; there is no local fallback.
#[async_trait]
pub trait MetadataSummarizer: Send + Sync {
    async fn generate_commit_message(
        &self,
        diff: &str,
        model: &ModelConfig,
        prompt: Option<&str>,
    ) -> Result<CommitMessage>;

    async fn generate_pr_metadata(
        &self,
        diff: &str,
        model: &ModelConfig,
        prompt: Option<&str>,
    ) -> Result<PullRequestMetadata>;
}
