//! OpenCode agent.

use std::collections::HashMap;

use super::{
    prompt_for_mode, shell_quote, AgentCommand, AgentMode, AgentProfile, AgentType, ModelConfig,
    ModelProvider,
};

/// Runs `opencode run` against a configurable model vendor.
#[derive(Debug, Clone)]
pub struct OpenCodeAgent {
    provider: ModelProvider,
    api_key: String,
    model: String,
}

impl OpenCodeAgent {
    pub fn new(provider: ModelProvider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn provider_slug(&self) -> &'static str {
        match self.provider {
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::OpenAi => "openai",
            ModelProvider::Google => "google",
            ModelProvider::OpenRouter => "openrouter",
        }
    }
}

impl AgentProfile for OpenCodeAgent {
    fn command_config(&self, prompt: &str, mode: AgentMode) -> AgentCommand {
        let model = format!("{}/{}", self.provider_slug(), self.model);
        let command = format!(
            "opencode run --model {} {}",
            shell_quote(&model),
            shell_quote(&prompt_for_mode(prompt, mode))
        );

        AgentCommand {
            command,
            error_prefix: "OpenCode".to_string(),
            label_name: "opencode".to_string(),
        }
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        HashMap::from([(
            self.provider.api_key_env().to_string(),
            self.api_key.clone(),
        )])
    }

    fn agent_type(&self) -> AgentType {
        AgentType::OpenCode
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: self.provider,
            api_key: self.api_key.clone(),
            model: self.model.clone(),
        }
    }
}
