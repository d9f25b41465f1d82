use std::str::FromStr;

use crate::error_handler::{ConfigError, LlmServiceError};

/// Represents the provider (backend) used for model inference.
///
/// Distinguishes between a local Ollama runtime and the OpenAI API. Adding
/// more providers later (e.g., Anthropic, Mistral API) means extending this
/// enum and the matching service in `services/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI's chat/embeddings API.
    OpenAI,
}

impl FromStr for LlmProvider {
    type Err = LlmServiceError;

    /// Parses the `LLM_KIND` environment value (`ollama` | `openai`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "chatgpt" => Ok(Self::OpenAI),
            other => Err(ConfigError::UnsupportedProvider(other.to_string()).into()),
        }
    }
}
