//! Agent variants that can be driven inside a sandbox.
//!
//! Each supported CLI agent (Claude Code, Codex, Gemini CLI, OpenCode)
//! knows how to turn a prompt into a shell command, which environment
//! variables it needs, and which model backs it. The set is closed: the
//! variant is chosen once when the agent is constructed.

mod claude;
mod codex;
mod gemini;
mod opencode;

pub use claude::ClaudeAgent;
pub use codex::CodexAgent;
pub use gemini::GeminiAgent;
pub use opencode::OpenCodeAgent;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an agent variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Codex,
    Gemini,
    OpenCode,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentType::Claude => "claude",
            AgentType::Codex => "codex",
            AgentType::Gemini => "gemini",
            AgentType::OpenCode => "opencode",
        };
        f.write_str(name)
    }
}

/// Whether the agent may modify the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Make changes.
    #[default]
    Code,
    /// Answer questions about the code without editing it.
    Ask,
}

/// Model vendor behind an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Anthropic,
    OpenAi,
    Google,
    OpenRouter,
}

impl ModelProvider {
    /// Environment variable carrying this vendor's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
            ModelProvider::Google => "GEMINI_API_KEY",
            ModelProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

/// Model settings handed to the metadata summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    /// Key for `provider`, as given to the agent.
    pub api_key: String,
    /// Model identifier in the provider's own naming.
    pub model: String,
}

/// Shell command produced for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub command: String,
    /// Prefix for errors raised while the command runs.
    pub error_prefix: String,
    /// Name of the label attached to pull requests from this agent.
    pub label_name: String,
}

/// Capability contract shared by every agent variant.
pub trait AgentProfile {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand;

    fn environment_variables(&self) -> HashMap<String, String>;

    fn agent_type(&self) -> AgentType;

    fn model_config(&self) -> ModelConfig;
}

/// The closed set of supported agents.
#[derive(Debug, Clone)]
pub enum AgentRunner {
    Claude(ClaudeAgent),
    Codex(CodexAgent),
    Gemini(GeminiAgent),
    OpenCode(OpenCodeAgent),
}

impl AgentRunner {
    fn profile(&self) -> &dyn AgentProfile {
        match self {
            AgentRunner::Claude(agent) => agent,
            AgentRunner::Codex(agent) => agent,
            AgentRunner::Gemini(agent) => agent,
            AgentRunner::OpenCode(agent) => agent,
        }
    }
}

impl AgentProfile for AgentRunner {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand {
        self.profile().command_config(prompt, mode)
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        self.profile().environment_variables()
    }

    fn agent_type(&self) -> AgentType {
        self.profile().agent_type()
    }

    fn model_config(&self) -> ModelConfig {
        self.profile().model_config()
    }
}

impl From<ClaudeAgent> for AgentRunner {
    fn from(agent: ClaudeAgent) -> Self {
        AgentRunner::Claude(agent)
    }
}

impl From<CodexAgent> for AgentRunner {
    fn from(agent: CodexAgent) -> Self {
        AgentRunner::Codex(agent)
    }
}

impl From<GeminiAgent> for AgentRunner {
    fn from(agent: GeminiAgent) -> Self {
        AgentRunner::Gemini(agent)
    }
}

impl From<OpenCodeAgent> for AgentRunner {
    fn from(agent: OpenCodeAgent) -> Self {
        AgentRunner::OpenCode(agent)
    }
}

/// Instruction prepended to prompts in [`AgentMode::Ask`].
pub(crate) const ASK_MODE_PREAMBLE: &str = "Research the repository and answer the user's \
questions. Do NOT make any changes to any files in the repository.";

/// Prepends the ask-mode instruction when needed.
pub(crate) fn prompt_for_mode(prompt: &str, mode: AgentMode) -> String {
    match mode {
        AgentMode::Code => prompt.to_string(),
        AgentMode::Ask => format!("{}\n\n{}", ASK_MODE_PREAMBLE, prompt),
    }
}

/// Quotes `value` for safe interpolation into a `sh -c` command line.
pub fn shell_quote(value: &str) -> String {
    shell_escape::unix::escape(value.into()).into_owned()
}
