//! Sandbox Agent CLI
//!
//! Runs one shell command (or one agent prompt) in a local sandbox and prints
//! the streamed output.

use std::path::PathBuf;
use std::sync::Arc;

use sandbox_agent::runner::{
    AgentRunner, ClaudeAgent, CodexAgent, GeminiAgent, ModelProvider, OpenCodeAgent,
};
use sandbox_agent::{
    AgentConfig, AgentUpdate, CodingAgent, ExecuteOptions, GenerateOptions, LocalSandboxProvider,
    StreamEvent, UpdateSink,
};
use tokio::sync::mpsc;

fn runner_from_env() -> AgentRunner {
    let name = std::env::var("SANDBOX_AGENT_RUNNER").unwrap_or_else(|_| "claude".to_string());
    let key = |provider: ModelProvider| std::env::var(provider.api_key_env()).unwrap_or_default();

    match name.as_str() {
        "codex" => CodexAgent::new(key(ModelProvider::OpenAi)).into(),
        "gemini" => GeminiAgent::new(key(ModelProvider::Google)).into(),
        "opencode" => {
            let model = std::env::var("SANDBOX_AGENT_MODEL")
                .unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string());
            OpenCodeAgent::new(
                ModelProvider::OpenRouter,
                key(ModelProvider::OpenRouter),
                model,
            )
            .into()
        }
        _ => {
            let agent = ClaudeAgent::new(key(ModelProvider::Anthropic));
            match std::env::var("CLAUDE_CODE_OAUTH_TOKEN") {
                Ok(token) => agent.with_oauth_token(token).into(),
                Err(_) => agent.into(),
            }
        }
    }
}

fn config_from_env() -> Result<AgentConfig, String> {
    if let Ok(path) = std::env::var("SANDBOX_AGENT_CONFIG") {
        return AgentConfig::load(&PathBuf::from(path)).map_err(|e| e.to_string());
    }
    let cwd = std::env::current_dir().map_err(|e| format!("failed to get current directory: {}", e))?;
    Ok(AgentConfig::new(cwd))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command>", args[0]);
        eprintln!("\nRuns a command in a local sandbox and streams its output.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  SANDBOX_AGENT_MODE=exec|generate      Run a shell command or an agent prompt (default: exec)");
        eprintln!("  SANDBOX_AGENT_RUNNER=claude|codex|gemini|opencode");
        eprintln!("  SANDBOX_AGENT_BRANCH=<branch>         Switch to (or create) a branch first");
        eprintln!("  SANDBOX_AGENT_CONFIG=<file>           TOML or YAML agent configuration");
        std::process::exit(1);
    }

    let input = args[1..].join(" ");
    let config = match config_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let branch = std::env::var("SANDBOX_AGENT_BRANCH").ok();
    let generate = std::env::var("SANDBOX_AGENT_MODE").is_ok_and(|mode| mode == "generate");

    let mut agent = CodingAgent::new(runner_from_env(), config)
        .with_sandbox_provider(Arc::new(LocalSandboxProvider::new()));

    let (tx, mut rx) = mpsc::channel(256);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                AgentUpdate::Output { event, .. } => match event {
                    StreamEvent::Json(value) => println!("{}", value),
                    StreamEvent::Text(text) => print!("{}", text),
                },
                AgentUpdate::Status(message) => {
                    if let Ok(line) = serde_json::to_string(&message) {
                        eprintln!("{}", line);
                    }
                }
                AgentUpdate::Error(e) => eprintln!("error: {}", e),
            }
        }
    });
    let updates = UpdateSink::new(tx);

    let result = if generate {
        let mut options = GenerateOptions::new().with_updates(updates);
        if let Some(branch) = branch {
            options = options.with_branch(branch);
        }
        agent.generate_code(&input, options).await
    } else {
        let mut options = ExecuteOptions::new().with_updates(updates);
        if let Some(branch) = branch {
            options = options.with_branch(branch);
        }
        agent.execute_command(&input, options).await
    };

    // The sink was moved into the options, so the channel is closed by now.
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "update printer failed");
    }

    match result {
        Ok(response) => std::process::exit(response.exit_code),
        Err(e) => {
            eprintln!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
