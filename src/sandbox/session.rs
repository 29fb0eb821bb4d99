//! Lazily acquired, cached sandbox session for one agent instance.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::provider::{CreateSandbox, SandboxProvider, SandboxSession};

/// Lifecycle state of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Active,
    Paused,
    Killed,
}

/// Owns at most one sandbox session.
///
/// The handle is created on first use and reused until it is killed or
/// paused. A persisted session id makes the next acquisition resume that
/// session instead of creating a new one.
pub struct SessionManager {
    provider: Option<Arc<dyn SandboxProvider>>,
    session: Option<Arc<dyn SandboxSession>>,
    session_id: Option<String>,
    state: SessionState,
}

impl SessionManager {
    pub fn new(provider: Option<Arc<dyn SandboxProvider>>, session_id: Option<String>) -> Self {
        Self {
            provider,
            session: None,
            session_id,
            state: SessionState::Uninitialized,
        }
    }

    pub fn set_provider(&mut self, provider: Arc<dyn SandboxProvider>) {
        self.provider = Some(provider);
    }

    fn provider(&self) -> Result<&Arc<dyn SandboxProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| Error::Config("no sandbox provider configured".to_string()))
    }

    /// Returns the cached session, resuming or creating it on first use.
    pub async fn get_sandbox(&mut self, request: &CreateSandbox) -> Result<Arc<dyn SandboxSession>> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }

        let provider = Arc::clone(self.provider()?);
        let session = match &self.session_id {
            Some(id) => {
                tracing::info!(session_id = %id, provider = provider.name(), "resuming sandbox");
                provider.resume(id).await?
            }
            None => {
                tracing::info!(
                    agent = %request.agent_type,
                    working_dir = ?request.working_directory,
                    provider = provider.name(),
                    "creating sandbox"
                );
                provider.create(request.clone()).await?
            }
        };

        self.session_id = Some(session.id().to_string());
        self.session = Some(Arc::clone(&session));
        self.state = SessionState::Active;
        Ok(session)
    }

    /// Terminates the session and forgets it.
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.kill().await?;
            tracing::info!(session_id = %session.id(), "killed sandbox");
        }
        self.session_id = None;
        self.state = SessionState::Killed;
        Ok(())
    }

    /// Pauses the session. The id is kept so it can be resumed.
    pub async fn pause(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.pause().await?;
            tracing::info!(session_id = %session.id(), "paused sandbox");
            self.state = SessionState::Paused;
        }
        Ok(())
    }

    /// Resumes the known session and caches the new handle.
    pub async fn resume(&mut self) -> Result<Arc<dyn SandboxSession>> {
        let id = self
            .session_id
            .clone()
            .ok_or_else(|| Error::Config("no sandbox session to resume".to_string()))?;
        let session = self.provider()?.resume(&id).await?;
        tracing::info!(session_id = %id, "resumed sandbox");

        self.session = Some(Arc::clone(&session));
        self.state = SessionState::Active;
        Ok(session)
    }

    pub async fn host(&self, port: u16) -> Result<String> {
        match &self.session {
            Some(session) => session.host(port).await,
            None => Err(Error::Config("no active sandbox session".to_string())),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Replaces the persisted id; a cached handle for another id is dropped.
    pub fn set_session_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.session.as_ref().is_some_and(|s| s.id() != id) {
            self.session = None;
            self.state = SessionState::Uninitialized;
        }
        self.session_id = Some(id);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::AgentType;
    use crate::sandbox::{CommandOutput, RunOptions};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubSession {
        id: String,
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SandboxSession for StubSession {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, _command: &str, _options: RunOptions) -> Result<CommandOutput> {
            Ok(CommandOutput::default())
        }

        async fn kill(&self) -> Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn host(&self, port: u16) -> Result<String> {
            Ok(format!("{}-{}.sandbox.test", port, self.id))
        }
    }

    #[derive(Default)]
    struct StubProvider {
        created: AtomicUsize,
        resumed: Mutex<Vec<String>>,
        kills: Arc<AtomicUsize>,
        last_env: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SandboxProvider for StubProvider {
        async fn create(&self, request: CreateSandbox) -> Result<Arc<dyn SandboxSession>> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            *self.last_env.lock().unwrap() = request.env_vars;
            Ok(Arc::new(StubSession {
                id: format!("sbx-{}", n),
                kills: Arc::clone(&self.kills),
            }))
        }

        async fn resume(&self, session_id: &str) -> Result<Arc<dyn SandboxSession>> {
            self.resumed.lock().unwrap().push(session_id.to_string());
            Ok(Arc::new(StubSession {
                id: session_id.to_string(),
                kills: Arc::clone(&self.kills),
            }))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn request() -> CreateSandbox {
        CreateSandbox {
            env_vars: HashMap::from([("ANTHROPIC_API_KEY".to_string(), "k".to_string())]),
            agent_type: AgentType::Claude,
            working_directory: "/vibe0".into(),
        }
    }

    #[tokio::test]
    async fn missing_provider_is_a_config_error() {
        let mut manager = SessionManager::new(None, None);
        let err = manager.get_sandbox(&request()).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn get_sandbox_is_idempotent() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider.clone()), None);

        let first = manager.get_sandbox(&request()).await.unwrap();
        let second = manager.get_sandbox(&request()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.session_id(), Some("sbx-0"));
        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(provider.last_env.lock().unwrap()["ANTHROPIC_API_KEY"], "k");
    }

    #[tokio::test]
    async fn persisted_session_id_is_resumed() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider.clone()), Some("sbx-old".to_string()));

        let session = manager.get_sandbox(&request()).await.unwrap();

        assert_eq!(session.id(), "sbx-old");
        assert_eq!(provider.created.load(Ordering::SeqCst), 0);
        assert_eq!(*provider.resumed.lock().unwrap(), vec!["sbx-old".to_string()]);
    }

    #[tokio::test]
    async fn kill_clears_cache_and_next_get_creates_new() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider.clone()), None);

        let first = manager.get_sandbox(&request()).await.unwrap();
        manager.kill().await.unwrap();
        assert_eq!(manager.state(), SessionState::Killed);
        assert_eq!(manager.session_id(), None);
        assert_eq!(provider.kills.load(Ordering::SeqCst), 1);

        let second = manager.get_sandbox(&request()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(provider.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pause_then_resume_recaches() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider.clone()), None);

        manager.get_sandbox(&request()).await.unwrap();
        manager.pause().await.unwrap();
        assert_eq!(manager.state(), SessionState::Paused);
        assert_eq!(manager.session_id(), Some("sbx-0"));

        let resumed = manager.resume().await.unwrap();
        assert_eq!(resumed.id(), "sbx-0");
        assert_eq!(manager.state(), SessionState::Active);

        let again = manager.get_sandbox(&request()).await.unwrap();
        assert!(Arc::ptr_eq(&resumed, &again));
    }

    #[tokio::test]
    async fn resume_without_session_fails() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider), None);
        assert!(matches!(manager.resume().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn set_session_id_drops_stale_handle() {
        let provider = Arc::new(StubProvider::default());
        let mut manager = SessionManager::new(Some(provider.clone()), None);

        manager.get_sandbox(&request()).await.unwrap();
        manager.set_session_id("sbx-other");

        let session = manager.get_sandbox(&request()).await.unwrap();
        assert_eq!(session.id(), "sbx-other");
        assert_eq!(manager.host(3000).await.unwrap(), "3000-sbx-other.sandbox.test");
    }
}
