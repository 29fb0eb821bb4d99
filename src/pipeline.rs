//! Command execution pipeline.
//!
//! [`CodingAgent`] is the orchestrator instance. It owns the sandbox session,
//! the last prompt, the last branch and the active worktree, and drives
//! commands through directory setup, branch resolution and streamed
//! execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::{AgentConfig, Validate};
use crate::error::{Error, Result};
use crate::events::{AgentUpdate, UpdateSink};
use crate::git::{quote_path, GitWorkflow, GitWorktreeContext, PushOutcome, PushRequest};
use crate::github::GitHubApi;
use crate::runner::{AgentMode, AgentProfile, AgentRunner};
use crate::sandbox::{
    CommandOutput, CreateSandbox, OutputChannel, OutputChunk, RunOptions, SandboxProvider,
    SandboxSession, SessionManager, SessionState,
};
use crate::secrets::SandboxSecrets;
use crate::stream::{
    parse_structured_output, wants_structured_output, JsonStreamExtractor, MessageKind,
    StreamingMessage,
};
use crate::summarizer::MetadataSummarizer;

/// Capacity of the queue between the sandbox transport and the reader task.
const OUTPUT_QUEUE_CAPACITY: usize = 256;

/// Prefix for transport failures of caller commands.
const EXECUTE_ERROR_PREFIX: &str = "failed to execute command";

/// Options for [`CodingAgent::execute_command`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Defaults to the configured command timeout.
    pub timeout: Option<Duration>,
    pub background: bool,
    /// Branch to switch to (or create) before running.
    pub branch: Option<String>,
    /// Parse stdout as newline-delimited structured messages.
    pub structured_output: bool,
    pub updates: UpdateSink,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_structured_output(mut self, structured: bool) -> Self {
        self.structured_output = structured;
        self
    }

    pub fn with_updates(mut self, updates: impl Into<UpdateSink>) -> Self {
        self.updates = updates.into();
        self
    }
}

/// Options for [`CodingAgent::generate_code`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub mode: AgentMode,
    pub branch: Option<String>,
    pub timeout: Option<Duration>,
    pub updates: UpdateSink,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_updates(mut self, updates: impl Into<UpdateSink>) -> Self {
        self.updates = updates.into();
        self
    }
}

/// Result of a command run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    /// Session the command ran in.
    pub sandbox_id: String,
    /// Process exit status; non-zero is not an error.
    pub exit_code: i32,
    /// Full standard output, including any JSON lines.
    pub stdout: String,
    pub stderr: String,
    /// Structured messages parsed from stdout, when requested or detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
}

/// One command run through the pipeline.
struct RunPlan<'a> {
    command: &'a str,
    timeout: Duration,
    background: bool,
    branch: Option<&'a str>,
    structured_output: bool,
    error_prefix: &'a str,
    updates: &'a UpdateSink,
}

/// A coding agent bound to at most one sandbox session.
pub struct CodingAgent {
    pub(crate) runner: AgentRunner,
    pub(crate) config: AgentConfig,
    pub(crate) sessions: SessionManager,
    pub(crate) secrets: SandboxSecrets,
    pub(crate) summarizer: Option<Arc<dyn MetadataSummarizer>>,
    pub(crate) github: Option<Arc<dyn GitHubApi>>,
    pub(crate) last_prompt: Option<String>,
    pub(crate) current_branch: Option<String>,
    pub(crate) worktree: Option<GitWorktreeContext>,
}

impl CodingAgent {
    pub fn new(runner: impl Into<AgentRunner>, config: AgentConfig) -> Self {
        let sessions = SessionManager::new(None, config.session_id.clone());
        let secrets = SandboxSecrets::from_map(config.secrets.clone());
        Self {
            runner: runner.into(),
            config,
            sessions,
            secrets,
            summarizer: None,
            github: None,
            last_prompt: None,
            current_branch: None,
            worktree: None,
        }
    }

    pub fn with_sandbox_provider(mut self, provider: Arc<dyn SandboxProvider>) -> Self {
        self.sessions.set_provider(provider);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn MetadataSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Overrides the GitHub client built from the configured token.
    pub fn with_github(mut self, github: Arc<dyn GitHubApi>) -> Self {
        self.github = Some(github);
        self
    }

    /// Adds secrets to the sandbox environment.
    pub fn with_secrets(mut self, secrets: SandboxSecrets) -> Self {
        self.secrets.extend(secrets);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn runner(&self) -> &AgentRunner {
        &self.runner
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn current_branch(&self) -> Option<&str> {
        self.current_branch.as_deref()
    }

    /// Worktree recorded by the last branch-scoped run, if any.
    pub fn active_worktree(&self) -> Option<&GitWorktreeContext> {
        self.worktree.as_ref()
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    fn sandbox_request(&self) -> CreateSandbox {
        CreateSandbox {
            env_vars: self.secrets.merge_into(self.runner.environment_variables()),
            agent_type: self.runner.agent_type(),
            working_directory: self.config.working_directory.clone(),
        }
    }

    /// Returns the session, creating or resuming it on first use.
    ///
    /// The configuration is validated before the first acquisition.
    pub async fn get_sandbox(&mut self) -> Result<Arc<dyn SandboxSession>> {
        if self.sessions.state() == SessionState::Uninitialized {
            for warning in self.config.validate().into_result()? {
                tracing::warn!("{}", warning);
            }
        }
        let request = self.sandbox_request();
        self.sessions.get_sandbox(&request).await
    }

    pub async fn kill_sandbox(&mut self) -> Result<()> {
        self.sessions.kill().await
    }

    pub async fn pause_sandbox(&mut self) -> Result<()> {
        self.sessions.pause().await
    }

    /// Resumes the known session and returns its id.
    pub async fn resume_sandbox(&mut self) -> Result<String> {
        let session = self.sessions.resume().await?;
        Ok(session.id().to_string())
    }

    pub async fn get_host(&self, port: u16) -> Result<String> {
        self.sessions.host(port).await
    }

    /// Session id for external persistence.
    pub fn get_session(&self) -> Option<&str> {
        self.sessions.session_id()
    }

    pub fn set_session(&mut self, session_id: impl Into<String>) {
        self.sessions.set_session_id(session_id);
    }

    /// Runs a shell command in the sandbox, optionally on `options.branch`.
    ///
    /// A working directory that is not a git repository skips branch setup
    /// and still runs the command. Transport failures are reported to the
    /// update sink before being returned.
    pub async fn execute_command(
        &mut self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<CommandResponse> {
        let plan = RunPlan {
            command,
            timeout: options.timeout.unwrap_or_else(|| self.config.timeouts.command()),
            background: options.background,
            branch: options.branch.as_deref(),
            structured_output: options.structured_output,
            error_prefix: EXECUTE_ERROR_PREFIX,
            updates: &options.updates,
        };
        self.run_plan(plan).await
    }

    /// Runs the agent CLI on `prompt` and records the prompt for later
    /// commit and pull request metadata.
    pub async fn generate_code(
        &mut self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<CommandResponse> {
        self.last_prompt = Some(prompt.to_string());
        let agent_command = self.runner.command_config(prompt, options.mode);
        tracing::info!(
            agent = %self.runner.agent_type(),
            mode = ?options.mode,
            branch = ?options.branch,
            "generating code"
        );

        let plan = RunPlan {
            command: &agent_command.command,
            timeout: options.timeout.unwrap_or_else(|| self.config.timeouts.command()),
            background: false,
            branch: options.branch.as_deref(),
            structured_output: false,
            error_prefix: &agent_command.error_prefix,
            updates: &options.updates,
        };
        self.run_plan(plan).await
    }

    async fn run_plan(&mut self, plan: RunPlan<'_>) -> Result<CommandResponse> {
        let updates = plan.updates;
        let prefix = plan.error_prefix.to_string();
        match self.run_plan_inner(plan).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let e = match e {
                    Error::Sandbox(msg) => Error::Sandbox(format!("{}: {}", prefix, msg)),
                    other => other,
                };
                tracing::error!(error = %e, "command failed");
                updates.error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_plan_inner(&mut self, plan: RunPlan<'_>) -> Result<CommandResponse> {
        let resuming = self.sessions.session_id().is_some();
        let session = self.get_sandbox().await?;
        let sandbox_id = session.id().to_string();

        if !resuming {
            plan.updates
                .status(
                    StreamingMessage::new(MessageKind::Start)
                        .with_sandbox_id(sandbox_id.as_str())
                        .with_message("Sandbox ready"),
                )
                .await;
        }

        let working_dir = self.config.working_directory.clone();
        let mkdir = format!("mkdir -p {}", quote_path(&working_dir));
        match session
            .run(&mkdir, RunOptions::new(self.config.timeouts.setup()))
            .await
        {
            Ok(output) if !output.success() => {
                tracing::debug!(stderr = %output.stderr.trim(), "mkdir of working directory failed")
            }
            Err(e) => tracing::debug!(error = %e, "mkdir of working directory failed"),
            Ok(_) => {}
        }

        let active_dir = match plan.branch {
            Some(branch) => self.resolve_branch(session.as_ref(), branch, plan.updates).await?,
            None => working_dir,
        };

        let full_command = format!("cd {} && {}", quote_path(&active_dir), plan.command);
        tracing::info!(
            sandbox_id = %sandbox_id,
            command = %self.secrets.redact(plan.command),
            background = plan.background,
            "running command"
        );

        let output = run_streaming(
            session.as_ref(),
            &full_command,
            plan.timeout,
            plan.background,
            plan.updates,
        )
        .await?;

        plan.updates
            .status(
                StreamingMessage::new(MessageKind::End)
                    .with_sandbox_id(sandbox_id.as_str())
                    .with_output(serde_json::to_string(&output)?),
            )
            .await;
        tracing::info!(sandbox_id = %sandbox_id, exit_code = output.exit_code, "command finished");

        let messages = wants_structured_output(plan.command, plan.structured_output)
            .then(|| parse_structured_output(&output.stdout));

        Ok(CommandResponse {
            sandbox_id,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            messages,
        })
    }

    /// Resolves `branch` and records it; returns the directory to run in.
    async fn resolve_branch(
        &mut self,
        session: &dyn SandboxSession,
        branch: &str,
        updates: &UpdateSink,
    ) -> Result<PathBuf> {
        let resolution = {
            let git = GitWorkflow::new(
                session,
                &self.config.working_directory,
                &self.config.timeouts,
                updates,
            );
            git.resolve_branch(branch, &self.config.worktrees).await?
        };
        tracing::info!(branch = %branch, state = ?resolution.state, dir = ?resolution.active_dir, "resolved branch");

        self.current_branch = Some(branch.to_string());
        if resolution.worktree.is_some() {
            self.worktree = resolution.worktree;
        }
        Ok(resolution.active_dir)
    }

    /// Worktree for `branch` when worktree mode is on.
    pub(crate) fn worktree_for(&self, branch: &str) -> Option<GitWorktreeContext> {
        if !self.config.worktrees.enabled {
            return None;
        }
        match &self.worktree {
            Some(context) if context.branch == branch => Some(context.clone()),
            _ => Some(GitWorktreeContext::new(
                branch,
                &self.config.working_directory,
                &self.config.worktrees,
            )),
        }
    }

    /// Like [`Self::worktree_for`], but a worktree this agent did not set up
    /// must already exist in the sandbox.
    pub(crate) async fn locate_worktree(
        &self,
        git: &GitWorkflow<'_>,
        branch: &str,
    ) -> Result<Option<GitWorktreeContext>> {
        let Some(context) = self.worktree_for(branch) else {
            return Ok(None);
        };
        let recorded = self.worktree.as_ref() == Some(&context);
        if !recorded {
            git.require_worktree(&context).await?;
        }
        Ok(Some(context))
    }

    pub(crate) fn require_summarizer(&self) -> Result<Arc<dyn MetadataSummarizer>> {
        self.summarizer
            .clone()
            .ok_or_else(|| Error::Config("no metadata summarizer configured".to_string()))
    }

    /// Commits and pushes pending changes on `branch`, or on the branch used
    /// by the last command when `None`.
    pub async fn push_to_branch(&mut self, branch: Option<&str>) -> Result<PushOutcome> {
        let branch = branch
            .map(String::from)
            .or_else(|| self.current_branch.clone())
            .ok_or_else(|| Error::Config("no branch specified and no branch in use".to_string()))?;
        let summarizer = self.require_summarizer()?;
        let session = self.get_sandbox().await?;

        let model = self.runner.model_config();
        let updates = UpdateSink::none();

        let outcome = {
            let git = GitWorkflow::new(
                session.as_ref(),
                &self.config.working_directory,
                &self.config.timeouts,
                &updates,
            );
            let worktree = self.locate_worktree(&git, &branch).await?;
            let dir = worktree
                .as_ref()
                .map(|context| context.path.clone())
                .unwrap_or_else(|| self.config.working_directory.clone());

            tracing::info!(branch = %branch, dir = ?dir, "pushing changes");
            git.push_changes(PushRequest {
                branch: &branch,
                dir: &dir,
                worktree: worktree.as_ref(),
                summarizer: summarizer.as_ref(),
                model: &model,
                prompt: self.last_prompt.as_deref(),
            })
            .await?
        };

        if outcome.worktree_removed {
            self.worktree = None;
        }
        self.current_branch = Some(branch);
        Ok(outcome)
    }
}

/// Runs `command`, feeding each output channel through its own extractor.
///
/// A reader task owns both extractors and forwards events to `updates` in
/// arrival order per channel. It drains after the transport closes the
/// queue, then flushes any trailing text.
async fn run_streaming(
    session: &dyn SandboxSession,
    command: &str,
    timeout: Duration,
    background: bool,
    updates: &UpdateSink,
) -> Result<CommandOutput> {
    let (tx, mut rx) = mpsc::channel::<OutputChunk>(OUTPUT_QUEUE_CAPACITY);
    let sink = updates.clone();

    let reader = tokio::spawn(async move {
        let mut stdout = JsonStreamExtractor::new();
        let mut stderr = JsonStreamExtractor::new();

        while let Some(chunk) = rx.recv().await {
            let extractor = match chunk.channel {
                OutputChannel::Stdout => &mut stdout,
                OutputChannel::Stderr => &mut stderr,
            };
            for event in extractor.push(&chunk.data) {
                sink.send(AgentUpdate::Output {
                    channel: chunk.channel,
                    event,
                })
                .await;
            }
        }

        for (channel, extractor) in [
            (OutputChannel::Stdout, &mut stdout),
            (OutputChannel::Stderr, &mut stderr),
        ] {
            if let Some(event) = extractor.flush() {
                sink.send(AgentUpdate::Output { channel, event }).await;
            }
        }
    });

    let options = RunOptions::new(timeout)
        .with_background(background)
        .with_output(tx);
    let result = session.run(command, options).await;

    if let Err(e) = reader.await {
        tracing::warn!(error = %e, "output reader task failed");
    }
    result
}
