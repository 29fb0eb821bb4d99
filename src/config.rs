//! Agent configuration and validation.
//!
//! Configuration can be built in code or loaded from a TOML or YAML file.
//! Validation runs before the first sandbox is acquired to catch errors early.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::github::{LabelOptions, RepoSlug, DEFAULT_API_BASE_URL};

/// Default working directory inside the sandbox.
pub const DEFAULT_WORKING_DIRECTORY: &str = "/vibe0";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// Worktree isolation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Check out branches into separate worktrees instead of switching the
    /// main checkout.
    pub enabled: bool,
    /// Directory holding the worktrees; defaults to `<working_directory>-wt`.
    pub root: Option<PathBuf>,
    /// Remove the worktree after a successful push.
    pub cleanup: bool,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: None,
            cleanup: true,
        }
    }
}

impl WorktreeConfig {
    /// Resolves the worktree root for `working_directory`.
    pub fn root_for(&self, working_directory: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.clone(),
            None => {
                let mut name = working_directory.as_os_str().to_os_string();
                name.push("-wt");
                PathBuf::from(name)
            }
        }
    }
}

/// GitHub publishing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: String,
    /// Default repository as `owner/repo`.
    #[serde(default)]
    pub repository: Option<String>,
    /// Label attached to created pull requests.
    #[serde(default)]
    pub label: Option<LabelOptions>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            repository: None,
            label: None,
            api_base_url: default_api_base_url(),
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_label(mut self, label: LabelOptions) -> Self {
        self.label = Some(label);
        self
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Caller commands, code generation, push and PR flows.
    pub command_ms: u64,
    /// Quick probes such as `git status`.
    pub probe_ms: u64,
    /// Directory setup.
    pub setup_ms: u64,
    /// Fetch, checkout and worktree operations.
    pub worktree_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_ms: 3_600_000,
            probe_ms: 10_000,
            setup_ms: 30_000,
            worktree_ms: 120_000,
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn setup(&self) -> Duration {
        Duration::from_millis(self.setup_ms)
    }

    pub fn worktree(&self) -> Duration {
        Duration::from_millis(self.worktree_ms)
    }
}

/// Configuration for one agent instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory inside the sandbox where commands run.
    pub working_directory: PathBuf,
    /// Persisted sandbox session to resume instead of creating one.
    pub session_id: Option<String>,
    pub worktrees: WorktreeConfig,
    pub github: Option<GitHubConfig>,
    pub timeouts: TimeoutConfig,
    /// Extra environment for the sandbox; overrides agent variables.
    pub secrets: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from(DEFAULT_WORKING_DIRECTORY),
            session_id: None,
            worktrees: WorktreeConfig::default(),
            github: None,
            timeouts: TimeoutConfig::default(),
            secrets: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            ..Default::default()
        }
    }

    pub fn with_worktrees(mut self, worktrees: WorktreeConfig) -> Self {
        self.worktrees = worktrees;
        self
    }

    pub fn with_github(mut self, github: GitHubConfig) -> Self {
        self.github = Some(github);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid TOML configuration: {}", e)))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid YAML configuration: {}", e)))
    }

    /// Loads a configuration file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(Error::Config(format!(
                "unsupported configuration format: {:?}",
                other.unwrap_or("")
            ))),
        }
    }

    /// Worktree root for this agent's working directory.
    pub fn worktree_root(&self) -> PathBuf {
        self.worktrees.root_for(&self.working_directory)
    }
}

impl Validate for TimeoutConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        for (name, value) in [
            ("command_ms", self.command_ms),
            ("probe_ms", self.probe_ms),
            ("setup_ms", self.setup_ms),
            ("worktree_ms", self.worktree_ms),
        ] {
            if value == 0 {
                result.add_error(format!("timeouts.{} must be greater than zero", name));
            } else if value < 1_000 {
                result.add_warning(format!(
                    "timeouts.{} under one second may cause spurious failures",
                    name
                ));
            }
        }

        result
    }
}

impl Validate for GitHubConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.token.trim().is_empty() {
            result.add_warning("github.token is empty; pull request calls will fail");
        }

        if let Some(repo) = &self.repository {
            if RepoSlug::parse(repo).is_none() {
                result.add_error(format!(
                    "github.repository '{}' is not of the form owner/repo",
                    repo
                ));
            }
        }

        if !self.api_base_url.starts_with("http") {
            result.add_error(format!(
                "github.api_base_url '{}' is not an http(s) URL",
                self.api_base_url
            ));
        }

        result
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.working_directory.as_os_str().is_empty() {
            result.add_error("working_directory cannot be empty");
        } else if !self.working_directory.is_absolute() {
            result.add_warning(format!(
                "working_directory '{}' is relative; commands resolve it against the sandbox cwd",
                self.working_directory.display()
            ));
        }

        if self.worktrees.enabled && self.worktree_root() == self.working_directory {
            result.add_error("worktrees.root must differ from working_directory");
        }

        if let Some(github) = &self.github {
            result.merge(github.validate());
        }
        result.merge(self.timeouts.validate());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sandbox_layout() {
        let config = AgentConfig::default();

        assert_eq!(config.working_directory, PathBuf::from("/vibe0"));
        assert_eq!(config.worktree_root(), PathBuf::from("/vibe0-wt"));
        assert!(!config.worktrees.enabled);
        assert!(config.worktrees.cleanup);
        assert_eq!(config.timeouts.command(), Duration::from_secs(3600));
        assert!(config.validate().is_valid());
    }

    #[test]
    fn explicit_worktree_root_wins() {
        let worktrees = WorktreeConfig {
            enabled: true,
            root: Some(PathBuf::from("/trees")),
            cleanup: false,
        };
        let config = AgentConfig::new("/repo").with_worktrees(worktrees);
        assert_eq!(config.worktree_root(), PathBuf::from("/trees"));
    }

    #[test]
    fn worktree_root_equal_to_working_directory_fails() {
        let worktrees = WorktreeConfig {
            enabled: true,
            root: Some(PathBuf::from("/repo")),
            cleanup: true,
        };
        let result = AgentConfig::new("/repo").with_worktrees(worktrees).validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("worktrees.root")));
    }

    #[test]
    fn empty_working_directory_fails() {
        let result = AgentConfig::new("").validate();
        assert!(result.errors.iter().any(|e| e.contains("working_directory")));
    }

    #[test]
    fn malformed_repository_fails() {
        let config =
            AgentConfig::default().with_github(GitHubConfig::new("ghp_x").with_repository("nope"));
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("owner/repo")));
    }

    #[test]
    fn empty_token_only_warns() {
        let result = GitHubConfig::new("  ").validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("token")));
    }

    #[test]
    fn short_timeouts_warn_and_zero_fails() {
        let timeouts = TimeoutConfig {
            probe_ms: 500,
            setup_ms: 0,
            ..Default::default()
        };
        let result = timeouts.validate();
        assert!(result.errors.iter().any(|e| e.contains("setup_ms")));
        assert!(result.warnings.iter().any(|w| w.contains("probe_ms")));
    }

    #[test]
    fn into_result_joins_errors() {
        let mut result = ValidationResult::default();
        result.add_error("first");
        result.add_error("second");

        match result.into_result() {
            Err(Error::Config(msg)) => assert_eq!(msg, "first; second"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn loads_toml() {
        let config = AgentConfig::from_toml_str(
            r#"
            working_directory = "/workspace"
            session_id = "sbx-123"

            [worktrees]
            enabled = true

            [github]
            token = "ghp_abc"
            repository = "acme/widgets"

            [github.label]
            name = "agent"
            color = "ededed"
            description = "Opened by an agent"

            [timeouts]
            probe_ms = 5000

            [secrets]
            NPM_TOKEN = "npm"
            "#,
        )
        .unwrap();

        assert_eq!(config.working_directory, PathBuf::from("/workspace"));
        assert_eq!(config.session_id.as_deref(), Some("sbx-123"));
        assert!(config.worktrees.enabled);
        assert!(config.worktrees.cleanup);
        let github = config.github.as_ref().unwrap();
        assert_eq!(github.repository.as_deref(), Some("acme/widgets"));
        assert_eq!(github.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(github.label.as_ref().unwrap().name, "agent");
        assert_eq!(config.timeouts.probe_ms, 5000);
        assert_eq!(config.timeouts.command_ms, 3_600_000);
        assert_eq!(config.secrets["NPM_TOKEN"], "npm");
    }

    #[test]
    fn loads_yaml_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(
            &path,
            "working_directory: /srv/app\nworktrees:\n  enabled: true\n  cleanup: false\n",
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.working_directory, PathBuf::from("/srv/app"));
        assert!(!config.worktrees.cleanup);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(AgentConfig::load(&path), Err(Error::Config(_))));
    }
}
