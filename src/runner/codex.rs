//! OpenAI Codex CLI agent.

use std::collections::HashMap;

use super::{
    prompt_for_mode, shell_quote, AgentCommand, AgentMode, AgentProfile, AgentType, ModelConfig,
    ModelProvider,
};

const DEFAULT_MODEL: &str = "codex-mini-latest";

/// Runs `codex exec` non-interactively with JSON event output.
#[derive(Debug, Clone)]
pub struct CodexAgent {
    api_key: String,
    model: Option<String>,
}

impl CodexAgent {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl AgentProfile for CodexAgent {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand {
        let mut parts = vec!["codex".to_string(), "exec".to_string(), "--json".to_string()];
        match mode {
            AgentMode::Code => parts.push("--full-auto".to_string()),
            AgentMode::Ask => {
                parts.push("--sandbox".to_string());
                parts.push("read-only".to_string());
            }
        }
        if let Some(model) = &self.model {
            parts.push("--model".to_string());
            parts.push(shell_quote(model));
        }
        parts.push(shell_quote(&prompt_for_mode(prompt, mode)));

        AgentCommand {
            command: parts.join(" "),
            error_prefix: "Codex".to_string(),
            label_name: "codex".to_string(),
        }
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        HashMap::from([("OPENAI_API_KEY".to_string(), self.api_key.clone())])
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Codex
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: ModelProvider::OpenAi,
            api_key: self.api_key.clone(),
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}
