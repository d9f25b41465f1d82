//! Default model configs loaded strictly from environment variables.
//!
//! Convenience constructors for [`ModelConfig`], grouped by provider and
//! role. Two roles are used by the translation pipeline:
//!
//! - **Generation** → the model that turns a few-shot prompt into PromQL
//! - **Embedding**  → the model that vectorizes text for retrieval
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND`       = provider kind (`ollama` | `openai`)
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`                = generation model (mandatory)
//! - `EMBEDDING_MODEL`             = embedding model (mandatory)
//!
//! OpenAI-specific:
//! - `OPENAI_API_KEY`         (mandatory)
//! - `OPENAI_MODEL`           = generation model (mandatory)
//! - `OPENAI_EMBEDDING_MODEL` = embedding model (mandatory)
//! - `OPENAI_URL`             = optional endpoint override

use std::str::FromStr;

use crate::{
    config::{model_config::ModelConfig, provider::LlmProvider},
    error_handler::{ConfigError, LlmServiceError, Result, env_opt_u32, must_env},
};

/// Resolves the Ollama endpoint strictly from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
///
/// # Errors
/// - [`ConfigError::MissingVar`] if both are missing
/// - [`ConfigError::InvalidNumber`] if `OLLAMA_PORT` is invalid
fn ollama_endpoint() -> Result<String> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            let _ = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "OLLAMA_PORT",
                    reason: "expected u16 (1..=65535)",
                })?;
            return Ok(format!("http://localhost:{port}"));
        }
    }
    Err(LlmServiceError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

fn openai_endpoint() -> String {
    std::env::var("OPENAI_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://api.openai.com".to_string())
}

/// Constructs the **generation** config from environment variables.
///
/// Routed by `LLM_KIND`; defaults to Ollama when unset.
///
/// # Defaults
/// - `temperature = Some(0.2)` (query synthesis wants low creativity)
/// - `timeout_secs = Some(60)`
pub fn generation_from_env() -> Result<ModelConfig> {
    let kind = provider_kind()?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    let cfg = match kind {
        LlmProvider::Ollama => ModelConfig {
            provider: LlmProvider::Ollama,
            model: must_env("OLLAMA_MODEL")?,
            endpoint: ollama_endpoint()?,
            api_key: None,
            max_tokens,
            temperature: Some(0.2),
            top_p: None,
            stop: vec![],
            timeout_secs: Some(60),
        },
        LlmProvider::OpenAI => ModelConfig {
            provider: LlmProvider::OpenAI,
            model: must_env("OPENAI_MODEL")?,
            endpoint: openai_endpoint(),
            api_key: Some(must_env("OPENAI_API_KEY")?),
            max_tokens,
            temperature: Some(0.2),
            top_p: None,
            stop: vec![],
            timeout_secs: Some(60),
        },
    };

    cfg.validate()?;
    Ok(cfg)
}

/// Constructs the **embedding** config from environment variables.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `timeout_secs = Some(30)`
pub fn embedding_from_env() -> Result<ModelConfig> {
    let kind = provider_kind()?;

    let cfg = match kind {
        LlmProvider::Ollama => ModelConfig {
            provider: LlmProvider::Ollama,
            model: must_env("EMBEDDING_MODEL")?,
            endpoint: ollama_endpoint()?,
            api_key: None,
            max_tokens: None,
            temperature: Some(0.0),
            top_p: None,
            stop: vec![],
            timeout_secs: Some(30),
        },
        LlmProvider::OpenAI => ModelConfig {
            provider: LlmProvider::OpenAI,
            model: must_env("OPENAI_EMBEDDING_MODEL")?,
            endpoint: openai_endpoint(),
            api_key: Some(must_env("OPENAI_API_KEY")?),
            max_tokens: None,
            temperature: Some(0.0),
            top_p: None,
            stop: vec![],
            timeout_secs: Some(30),
        },
    };

    cfg.validate()?;
    Ok(cfg)
}

fn provider_kind() -> Result<LlmProvider> {
    match std::env::var("LLM_KIND") {
        Ok(v) if !v.trim().is_empty() => LlmProvider::from_str(&v),
        _ => Ok(LlmProvider::Ollama),
    }
}
