//! Sandbox capability traits and types.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::runner::AgentType;

/// Output stream a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Stdout => write!(f, "stdout"),
            OutputChannel::Stderr => write!(f, "stderr"),
        }
    }
}

/// A piece of command output, delivered in arrival order per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub channel: OutputChannel,
    pub data: String,
}

/// Options for a single command run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on the run; expiry is reported as a transport error.
    pub timeout: Duration,
    /// Start the command and return without waiting for it.
    pub background: bool,
    /// Receives output chunks as they arrive.
    pub output: Option<mpsc::Sender<OutputChunk>>,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            background: false,
            output: None,
        }
    }

    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn with_output(mut self, output: mpsc::Sender<OutputChunk>) -> Self {
        self.output = Some(output);
        self
    }
}

/// Result of a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Parameters for creating a new sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSandbox {
    pub env_vars: HashMap<String, String>,
    pub agent_type: AgentType,
    pub working_directory: PathBuf,
}

/// A live sandbox in which shell commands run.
#[async_trait]
pub trait SandboxSession: Send + Sync {
    /// Identifier that can later be passed to [`SandboxProvider::resume`].
    fn id(&self) -> &str;

    /// Runs a shell command.
    ///
    /// A non-zero exit code is not an error; only transport failures
    /// (including timeout) are.
    async fn run(&self, command: &str, options: RunOptions) -> Result<CommandOutput>;

    /// Terminates the sandbox.
    async fn kill(&self) -> Result<()>;

    /// Suspends the sandbox so it can be resumed later.
    async fn pause(&self) -> Result<()>;

    /// Returns an externally reachable host for `port`.
    async fn host(&self, port: u16) -> Result<String>;
}

/// Backend able to create and resume sandboxes.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, request: CreateSandbox) -> Result<Arc<dyn SandboxSession>>;

    async fn resume(&self, session_id: &str) -> Result<Arc<dyn SandboxSession>>;

    /// Returns the name of this provider.
    fn name(&self) -> &str;
}
