//! Gemini CLI agent.

use std::collections::HashMap;

use super::{
    prompt_for_mode, shell_quote, AgentCommand, AgentMode, AgentProfile, AgentType, ModelConfig,
    ModelProvider,
};

const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Runs the `gemini` CLI non-interactively.
#[derive(Debug, Clone)]
pub struct GeminiAgent {
    api_key: String,
    model: Option<String>,
}

impl GeminiAgent {
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

    fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }
}

impl AgentProfile for GeminiAgent {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand {
        let mut parts = vec![
            "gemini".to_string(),
            "--model".to_string(),
            shell_quote(&self.model()),
        ];
        // Auto-approve tool calls only when edits are wanted.
        if mode == AgentMode::Code {
            parts.push("--yolo".to_string());
        }
        parts.push("-p".to_string());
        parts.push(shell_quote(&prompt_for_mode(prompt, mode)));

        AgentCommand {
            command: parts.join(" "),
            error_prefix: "Gemini".to_string(),
            label_name: "gemini".to_string(),
        }
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        HashMap::from([("GEMINI_API_KEY".to_string(), self.api_key.clone())])
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Gemini
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: ModelProvider::Google,
            api_key: self.api_key.clone(),
            model: self.model(),
        }
    }
}
