//! Configuration loading
//!
//! Settings come from `.vkllama.toml`, found by walking up from the
//! current directory, with a global fallback under the platform config
//! directory. The loaded value is passed into the session and server
//! explicitly; there is no process-wide mutable configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

/// Find a config file by walking up the directory tree, then checking
/// the global config at ~/.config/vkllama/.
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("vkllama").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Top-level configuration (from .vkllama.toml)
#[derive(Debug, Default, Deserialize)]
pub struct VkllamaConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub serve: ServeSectionConfig,
    /// Model registry for `serve`: alias -> upstream model name.
    /// Empty means requests pass through unmapped.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

/// Client-side settings: which server to talk to, with which model
#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
}

/// Server-side settings for `vkllama serve`
#[derive(Debug, Deserialize)]
pub struct ServeSectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Inference runtime the server forwards requests to
    #[serde(default = "default_upstream")]
    pub upstream: String,
}

fn default_address() -> String {
    "http://localhost:11435".to_string()
}

fn default_model() -> String {
    "gemma3".to_string()
}

fn default_num_ctx() -> u32 {
    2048
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    11435
}

fn default_upstream() -> String {
    "http://localhost:11434".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            model: default_model(),
            num_ctx: default_num_ctx(),
        }
    }
}

impl Default for ServeSectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: default_upstream(),
        }
    }
}

impl VkllamaConfig {
    /// Load config from .vkllama.toml, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(".vkllama.toml") {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }
        tracing::debug!("No .vkllama.toml found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VkllamaConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VkllamaConfig::default();
        assert_eq!(config.llm.address, "http://localhost:11435");
        assert_eq!(config.llm.model, "gemma3");
        assert_eq!(config.llm.num_ctx, 2048);
        assert_eq!(config.serve.port, 11435);
        assert_eq!(config.serve.upstream, "http://localhost:11434");
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: VkllamaConfig = toml::from_str(
            r#"
            [llm]
            model = "qwen3:4b"

            [serve]
            port = 8088

            [models]
            gemma3 = "gemma3:4b-it-q4_K_M"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "qwen3:4b");
        // Unspecified fields keep their defaults
        assert_eq!(config.llm.address, "http://localhost:11435");
        assert_eq!(config.serve.port, 8088);
        assert_eq!(config.serve.host, "0.0.0.0");
        assert_eq!(config.models["gemma3"], "gemma3:4b-it-q4_K_M");
    }
}
