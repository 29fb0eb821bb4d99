//! Host-process sandbox provider.
//!
//! Runs commands with `sh -c` on the local machine. There is no isolation;
//! it exists so the orchestrator can be driven end to end without a remote
//! backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::provider::{
    CommandOutput, CreateSandbox, OutputChannel, OutputChunk, RunOptions, SandboxProvider,
    SandboxSession,
};

const READ_BUFFER_SIZE: usize = 4096;

/// A sandbox backed by local shell processes.
pub struct LocalSandbox {
    id: String,
    env: HashMap<String, String>,
    working_directory: PathBuf,
    paused: AtomicBool,
    killed: AtomicBool,
}

impl LocalSandbox {
    pub fn working_directory(&self) -> &PathBuf {
        &self.working_directory
    }

    fn ensure_runnable(&self) -> Result<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(Error::Sandbox(format!("sandbox {} was killed", self.id)));
        }
        if self.paused.load(Ordering::SeqCst) {
            return Err(Error::Sandbox(format!("sandbox {} is paused", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxSession for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, command: &str, options: RunOptions) -> Result<CommandOutput> {
        self.ensure_runnable()?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if options.background {
            let mut child = cmd
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| Error::Sandbox(format!("failed to spawn shell: {}", e)))?;
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    tracing::warn!(error = %e, "background command failed");
                }
            });
            return Ok(CommandOutput::default());
        }

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn shell: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Sandbox("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Sandbox("stderr was not piped".to_string()))?;

        let tx = options.output;
        let run = async {
            let (out, err) = tokio::join!(
                pump(stdout, OutputChannel::Stdout, tx.clone()),
                pump(stderr, OutputChannel::Stderr, tx.clone()),
            );
            let status = child.wait().await?;
            Ok::<_, Error>(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: out?,
                stderr: err?,
            })
        };

        match tokio::time::timeout(options.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::Sandbox(format!(
                "command timed out after {}ms",
                options.timeout.as_millis()
            ))),
        }
    }

    async fn kill(&self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn host(&self, port: u16) -> Result<String> {
        Ok(format!("localhost:{}", port))
    }
}

/// Reads a pipe to the end, forwarding decoded chunks as they arrive.
async fn pump<R>(
    mut reader: R,
    channel: OutputChannel,
    tx: Option<mpsc::Sender<OutputChunk>>,
) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut pending: Vec<u8> = Vec::new();
    let mut collected = String::new();

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);

        // Hold back an incomplete UTF-8 sequence until the next read.
        let valid = match std::str::from_utf8(&pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        if valid == 0 {
            continue;
        }

        let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
        pending.drain(..valid);
        forward(&mut collected, channel, text, tx.as_ref()).await;
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        forward(&mut collected, channel, text, tx.as_ref()).await;
    }

    Ok(collected)
}

async fn forward(
    collected: &mut String,
    channel: OutputChannel,
    data: String,
    tx: Option<&mpsc::Sender<OutputChunk>>,
) {
    collected.push_str(&data);
    if let Some(tx) = tx {
        if tx.send(OutputChunk { channel, data }).await.is_err() {
            tracing::debug!(%channel, "output receiver dropped");
        }
    }
}

/// Provider that creates [`LocalSandbox`] sessions.
#[derive(Clone, Default)]
pub struct LocalSandboxProvider {
    sessions: Arc<Mutex<HashMap<String, Arc<LocalSandbox>>>>,
}

impl LocalSandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, session_id: &str) -> Result<Option<Arc<LocalSandbox>>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| Error::Sandbox("session registry poisoned".to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn create(&self, request: CreateSandbox) -> Result<Arc<dyn SandboxSession>> {
        let id = format!("local-{}", uuid::Uuid::new_v4());
        let sandbox = Arc::new(LocalSandbox {
            id: id.clone(),
            env: request.env_vars,
            working_directory: request.working_directory,
            paused: AtomicBool::new(false),
            killed: AtomicBool::new(false),
        });

        {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| Error::Sandbox("session registry poisoned".to_string()))?;
            // Killed sessions can never be resumed.
            sessions.retain(|_, session| !session.killed.load(Ordering::SeqCst));
            sessions.insert(id.clone(), Arc::clone(&sandbox));
        }

        tracing::debug!(session_id = %id, agent = %request.agent_type, "created local sandbox");
        Ok(sandbox)
    }

    async fn resume(&self, session_id: &str) -> Result<Arc<dyn SandboxSession>> {
        let sandbox = self
            .lookup(session_id)?
            .ok_or_else(|| Error::Sandbox(format!("unknown sandbox session: {}", session_id)))?;
        if sandbox.killed.load(Ordering::SeqCst) {
            if let Ok(mut sessions) = self.sessions.lock() {
                sessions.remove(session_id);
            }
            return Err(Error::Sandbox(format!("sandbox {} was killed", session_id)));
        }
        sandbox.paused.store(false, Ordering::SeqCst);
        Ok(sandbox)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::AgentType;
    use std::time::Duration;

    fn request() -> CreateSandbox {
        CreateSandbox {
            env_vars: HashMap::from([("GREETING".to_string(), "hello".to_string())]),
            agent_type: AgentType::Codex,
            working_directory: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn runs_command_with_environment() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();

        let output = sandbox
            .run("echo $GREETING; echo oops >&2; exit 3", RunOptions::new(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn streams_chunks_per_channel() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(64);

        sandbox
            .run(
                "printf one; printf two >&2",
                RunOptions::new(Duration::from_secs(10)).with_output(tx),
            )
            .await
            .unwrap();

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk.channel {
                OutputChannel::Stdout => stdout.push_str(&chunk.data),
                OutputChannel::Stderr => stderr.push_str(&chunk.data),
            }
        }
        assert_eq!(stdout, "one");
        assert_eq!(stderr, "two");
    }

    #[tokio::test]
    async fn timeout_is_a_sandbox_error() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();

        let result = sandbox
            .run("sleep 5", RunOptions::new(Duration::from_millis(100)))
            .await;

        match result {
            Err(Error::Sandbox(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn background_returns_immediately() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();

        let output = sandbox
            .run(
                "sleep 2",
                RunOptions::new(Duration::from_millis(500)).with_background(true),
            )
            .await
            .unwrap();
        assert_eq!(output, CommandOutput::default());
    }

    #[tokio::test]
    async fn paused_sandbox_rejects_commands_until_resumed() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();
        sandbox.pause().await.unwrap();

        let rejected = sandbox
            .run("true", RunOptions::new(Duration::from_secs(5)))
            .await;
        assert!(rejected.is_err());

        let resumed = provider.resume(sandbox.id()).await.unwrap();
        let output = resumed
            .run("true", RunOptions::new(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(output.success());
    }

    #[tokio::test]
    async fn killed_sandbox_cannot_be_resumed() {
        let provider = LocalSandboxProvider::new();
        let sandbox = provider.create(request()).await.unwrap();
        sandbox.kill().await.unwrap();

        assert!(provider.resume(sandbox.id()).await.is_err());
        assert!(provider.resume("local-missing").await.is_err());
    }

    #[tokio::test]
    async fn killed_sessions_leave_the_registry() {
        let provider = LocalSandboxProvider::new();
        for _ in 0..3 {
            let sandbox = provider.create(request()).await.unwrap();
            sandbox.kill().await.unwrap();
        }
        let live = provider.create(request()).await.unwrap();

        {
            let sessions = provider.sessions.lock().unwrap();
            assert_eq!(sessions.len(), 1);
            assert!(sessions.contains_key(live.id()));
        }

        live.kill().await.unwrap();
        assert!(provider.resume(live.id()).await.is_err());
        assert!(provider.sessions.lock().unwrap().is_empty());
    }
}
