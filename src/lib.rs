//! Sandbox Agent - drive AI coding agents inside remote sandboxes
//!
//! This library runs agent CLIs and shell commands in a sandbox session with
//! live streamed output, manages the git branch or worktree the work happens
//! on, and publishes the result as a GitHub pull request.

pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod pr;
pub mod runner;
pub mod sandbox;
pub mod secrets;
pub mod stream;
pub mod summarizer;

pub use config::{
    AgentConfig, GitHubConfig, TimeoutConfig, Validate, ValidationResult, WorktreeConfig,
};
pub use error::{Error, Result};
pub use events::{AgentUpdate, UpdateSink};
pub use git::{BranchResolution, GitWorkflow, GitWorktreeContext, PushOutcome, RepoState};
pub use github::{GitHubApi, LabelOptions, MergeMethod, MergeOptions, RepoSlug, RestGitHub};
pub use pipeline::{CodingAgent, CommandResponse, ExecuteOptions, GenerateOptions};
pub use pr::{PullRequestOptions, PullRequestPublisher, PullRequestResult};
pub use runner::{
    AgentMode, AgentProfile, AgentRunner, AgentType, ClaudeAgent, CodexAgent, GeminiAgent,
    ModelConfig, ModelProvider, OpenCodeAgent,
};
pub use sandbox::{LocalSandboxProvider, SandboxProvider, SandboxSession, SessionState};
pub use secrets::{SandboxSecrets, SecretError, SecretRef, SecretSource};
pub use stream::{JsonStreamExtractor, MessageKind, StreamEvent, StreamingMessage};
pub use summarizer::{CommitMessage, MetadataSummarizer, PullRequestMetadata};
