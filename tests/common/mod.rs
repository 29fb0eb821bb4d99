//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sandbox_agent::github::{
    GitHubApi, GitHubLabel, GitHubPullRequest, GitHubUser, GitRef, LabelOptions, MergeOptions,
    MergeResult, NewPullRequest, RepoSlug,
};
use sandbox_agent::runner::ModelConfig;
use sandbox_agent::sandbox::{
    CommandOutput, CreateSandbox, OutputChannel, OutputChunk, RunOptions, SandboxProvider,
    SandboxSession,
};
use sandbox_agent::summarizer::{CommitMessage, MetadataSummarizer, PullRequestMetadata};
use sandbox_agent::{AgentUpdate, Error, Result};
use tokio::sync::mpsc;

enum Reply {
    Output(CommandOutput),
    Fail(String),
}

/// Canned replies keyed by a substring of the command. First match wins;
/// unmatched commands succeed with empty output.
#[derive(Default)]
pub struct Script {
    rules: Mutex<Vec<(String, Reply)>>,
    log: Mutex<Vec<String>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, pattern: &str, exit_code: i32, stdout: &str) {
        self.rules.lock().unwrap().push((
            pattern.to_string(),
            Reply::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        ));
    }

    pub fn fail(&self, pattern: &str, message: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Reply::Fail(message.to_string())));
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands().iter().any(|c| c.contains(pattern))
    }

    fn answer(&self, command: &str) -> Result<CommandOutput> {
        self.log.lock().unwrap().push(command.to_string());
        let rules = self.rules.lock().unwrap();
        match rules.iter().find(|(pattern, _)| command.contains(pattern.as_str())) {
            Some((_, Reply::Output(output))) => Ok(output.clone()),
            Some((_, Reply::Fail(message))) => Err(Error::Sandbox(message.clone())),
            None => Ok(CommandOutput::default()),
        }
    }
}

pub struct ScriptedSession {
    id: String,
    script: Arc<Script>,
}

#[async_trait]
impl SandboxSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, command: &str, options: RunOptions) -> Result<CommandOutput> {
        let output = self.script.answer(command)?;
        if let Some(tx) = options.output {
            for (channel, data) in [
                (OutputChannel::Stdout, &output.stdout),
                (OutputChannel::Stderr, &output.stderr),
            ] {
                if !data.is_empty() {
                    let _ = tx
                        .send(OutputChunk {
                            channel,
                            data: data.clone(),
                        })
                        .await;
                }
            }
        }
        Ok(output)
    }

    async fn kill(&self) -> Result<()> {
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn host(&self, port: u16) -> Result<String> {
        Ok(format!("{}-{}.sandbox.test", port, self.id))
    }
}

pub struct ScriptedProvider {
    pub script: Arc<Script>,
    pub created: AtomicUsize,
    pub last_request: Mutex<Option<CreateSandbox>>,
}

impl ScriptedProvider {
    pub fn new(script: Arc<Script>) -> Arc<Self> {
        Arc::new(Self {
            script,
            created: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvider for ScriptedProvider {
    async fn create(&self, request: CreateSandbox) -> Result<Arc<dyn SandboxSession>> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request);
        Ok(Arc::new(ScriptedSession {
            id: format!("sbx-{}", n),
            script: Arc::clone(&self.script),
        }))
    }

    async fn resume(&self, session_id: &str) -> Result<Arc<dyn SandboxSession>> {
        Ok(Arc::new(ScriptedSession {
            id: session_id.to_string(),
            script: Arc::clone(&self.script),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Summarizer returning fixed metadata and remembering the diffs it saw.
pub struct FakeSummarizer {
    pub diffs: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<Option<String>>>,
    pub metadata: PullRequestMetadata,
}

impl FakeSummarizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            diffs: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            metadata: PullRequestMetadata {
                title: "Add cache".to_string(),
                body: "Adds a read-through cache.".to_string(),
                branch_name: "add-cache".to_string(),
                commit_message: "Add \"cache\" layer".to_string(),
            },
        })
    }

    pub fn diffs(&self) -> Vec<String> {
        self.diffs.lock().unwrap().clone()
    }

    fn record(&self, diff: &str, prompt: Option<&str>) {
        self.diffs.lock().unwrap().push(diff.to_string());
        self.prompts.lock().unwrap().push(prompt.map(String::from));
    }
}

#[async_trait]
impl MetadataSummarizer for FakeSummarizer {
    async fn generate_commit_message(
        &self,
        diff: &str,
        _model: &ModelConfig,
        prompt: Option<&str>,
    ) -> Result<CommitMessage> {
        self.record(diff, prompt);
        Ok(CommitMessage {
            commit_message: self.metadata.commit_message.clone(),
        })
    }

    async fn generate_pr_metadata(
        &self,
        diff: &str,
        _model: &ModelConfig,
        prompt: Option<&str>,
    ) -> Result<PullRequestMetadata> {
        self.record(diff, prompt);
        Ok(self.metadata.clone())
    }
}

/// GitHub double recording every call by name.
pub struct FakeGitHub {
    pub calls: Mutex<Vec<String>>,
    pub label_exists: bool,
    pub fail_labels: bool,
    pub requests: Mutex<Vec<NewPullRequest>>,
    pub attached: Mutex<Vec<String>>,
}

impl FakeGitHub {
    pub fn new(label_exists: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            label_exists,
            fail_labels: false,
            requests: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_labels() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            label_exists: true,
            fail_labels: true,
            requests: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Label names passed to `add_labels`, in order.
    pub fn attached(&self) -> Vec<String> {
        self.attached.lock().unwrap().clone()
    }

    fn call(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn create_pull_request(
        &self,
        _repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<GitHubPullRequest> {
        self.call("create_pull_request");
        self.requests.lock().unwrap().push(request.clone());
        Ok(GitHubPullRequest {
            id: 900,
            number: 42,
            state: "open".to_string(),
            html_url: "https://github.com/acme/widgets/pull/42".to_string(),
            title: request.title.clone(),
            user: Some(GitHubUser {
                login: "agent-bot".to_string(),
            }),
            head: GitRef {
                ref_name: request.head.clone(),
                sha: None,
            },
            base: GitRef {
                ref_name: request.base.clone(),
                sha: None,
            },
            merged: Some(false),
            mergeable: None,
        })
    }

    async fn get_label(&self, _repo: &RepoSlug, name: &str) -> Result<Option<GitHubLabel>> {
        self.call("get_label");
        if self.fail_labels {
            return Err(Error::GitHub {
                status: 500,
                message: "labels unavailable".to_string(),
            });
        }
        Ok(self.label_exists.then(|| GitHubLabel {
            id: Some(1),
            name: name.to_string(),
            color: "ededed".to_string(),
            description: None,
        }))
    }

    async fn create_label(&self, _repo: &RepoSlug, label: &LabelOptions) -> Result<GitHubLabel> {
        self.call("create_label");
        Ok(GitHubLabel {
            id: Some(2),
            name: label.name.clone(),
            color: label.color.clone(),
            description: Some(label.description.clone()),
        })
    }

    async fn add_labels(&self, _repo: &RepoSlug, _number: u64, labels: &[String]) -> Result<()> {
        self.call("add_labels");
        self.attached.lock().unwrap().extend(labels.iter().cloned());
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        _repo: &RepoSlug,
        _number: u64,
        _options: &MergeOptions,
    ) -> Result<MergeResult> {
        self.call("merge_pull_request");
        Ok(MergeResult {
            sha: "deadbeef".to_string(),
            merged: true,
            message: "Pull Request successfully merged".to_string(),
        })
    }
}

/// Collects everything currently queued on an update channel.
pub fn drain(rx: &mut mpsc::Receiver<AgentUpdate>) -> Vec<AgentUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}
