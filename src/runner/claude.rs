//! Claude Code agent.

use std::collections::HashMap;

use super::{
    prompt_for_mode, shell_quote, AgentCommand, AgentMode, AgentProfile, AgentType, ModelConfig,
    ModelProvider,
};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Tools withheld from Claude in [`AgentMode::Ask`].
const ASK_MODE_DISALLOWED_TOOLS: &str = "Edit,MultiEdit,Write,NotebookEdit";

/// Runs the `claude` CLI in headless streaming mode.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    api_key: String,
    /// OAuth token used instead of the API key when present.
    oauth_token: Option<String>,
    model: Option<String>,
}

impl ClaudeAgent {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            oauth_token: None,
            model: None,
        }
    }

    pub fn with_oauth_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn build_args(&self, mode: AgentMode) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--dangerously-skip-permissions".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(shell_quote(model));
        }

        if mode == AgentMode::Ask {
            args.push("--disallowedTools".to_string());
            args.push(ASK_MODE_DISALLOWED_TOOLS.to_string());
        }

        args
    }
}

impl AgentProfile for ClaudeAgent {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand {
        let mut parts = vec!["claude".to_string()];
        parts.extend(self.build_args(mode));
        parts.push("-p".to_string());
        parts.push(shell_quote(&prompt_for_mode(prompt, mode)));

        AgentCommand {
            command: parts.join(" "),
            error_prefix: "Claude".to_string(),
            label_name: "claude".to_string(),
        }
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        match &self.oauth_token {
            Some(token) => {
                env.insert("CLAUDE_CODE_OAUTH_TOKEN".to_string(), token.clone());
            }
            None => {
                env.insert("ANTHROPIC_API_KEY".to_string(), self.api_key.clone());
            }
        }
        env
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Claude
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: ModelProvider::Anthropic,
            api_key: self.api_key.clone(),
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}
