//! Caller-supplied secrets for sandbox sessions.
//!
//! Secrets are merged into the environment of newly created sandboxes and
//! scrubbed from any command text that reaches the logs.

use std::collections::{BTreeMap, HashMap};
use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a secret value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// Read from a host environment variable.
    EnvVar(String),
    /// Read from a file; surrounding whitespace is trimmed.
    File(String),
    /// Inline value.
    Direct(String),
}

/// A named secret exposed to the sandbox as an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub source: SecretSource,
}

/// Error type for secret resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
}

/// Resolved secrets for one agent instance.
#[derive(Debug, Clone, Default)]
pub struct SandboxSecrets {
    values: BTreeMap<String, String>,
}

impl SandboxSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds secrets from already-resolved name/value pairs.
    pub fn from_map(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Resolves a secret from its source and stores it.
    pub fn load(&mut self, secret: &SecretRef) -> Result<(), SecretError> {
        let value = match &secret.source {
            SecretSource::EnvVar(var) => env::var(var).map_err(|_| {
                SecretError::NotFound(format!("environment variable '{}' not set", var))
            })?,
            SecretSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| SecretError::NotFound(format!("cannot read file '{}': {}", path, e)))?
                .trim()
                .to_string(),
            SecretSource::Direct(value) => value.clone(),
        };

        self.values.insert(secret.name.clone(), value);
        Ok(())
    }

    /// Adds `other`'s values, replacing entries with the same name.
    pub fn extend(&mut self, other: SandboxSecrets) {
        self.values.extend(other.values);
    }

    /// Merges secrets over `base`; secrets win on key collisions.
    pub fn merge_into(&self, base: HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = base;
        for (name, value) in &self.values {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Replaces every known secret value with `[REDACTED:<name>]`.
    ///
    /// Longer values are replaced first so a secret that contains another
    /// secret is not partially leaked.
    pub fn redact(&self, text: &str) -> String {
        let mut pairs: Vec<(&String, &String)> =
            self.values.iter().filter(|(_, v)| !v.is_empty()).collect();
        pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut result = text.to_string();
        for (name, value) in pairs {
            result = result.replace(value.as_str(), &format!("[REDACTED:{}]", name));
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
