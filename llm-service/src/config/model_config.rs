use crate::config::provider::LlmProvider;
use crate::error_handler::{
    Result, validate_http_endpoint, validate_range_f32, validate_stop_sequences,
};
use crate::error_handler::ConfigError;

/// Configuration for a single model invocation profile.
///
/// Contains both general and provider-specific parameters. One instance
/// describes one role (generation or embedding); the same struct is reused
/// for both.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// The LLM provider/backend (Ollama or OpenAI).
    pub provider: LlmProvider,

    /// Model identifier string (e.g., `"gpt-4o"`, `"qwen3:14b"`).
    pub model: String,

    /// Inference endpoint (local server or remote API URL).
    pub endpoint: String,

    /// Optional API key for authentication (OpenAI).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic).
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Sequences at which the provider must stop generating.
    pub stop: Vec<String>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl ModelConfig {
    /// Validates the config fields against their allowed shapes and ranges.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] variant for an empty model, a malformed
    /// endpoint, out-of-range sampling parameters, or empty stop sequences.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        validate_http_endpoint("endpoint", &self.endpoint)?;
        if let Some(t) = self.temperature {
            validate_range_f32("temperature", t, 0.0, 2.0)?;
        }
        if let Some(p) = self.top_p {
            validate_range_f32("top_p", p, 0.0, 1.0)?;
        }
        validate_stop_sequences(&self.stop)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ModelConfig {
        ModelConfig {
            provider: LlmProvider::Ollama,
            model: "qwen3:14b".into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: Some(512),
            temperature: Some(0.2),
            top_p: None,
            stop: vec![],
            timeout_secs: Some(30),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn empty_model_rejected() {
        let mut cfg = base();
        cfg.model = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_endpoint_rejected() {
        let mut cfg = base();
        cfg.endpoint = "localhost:11434".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut cfg = base();
        cfg.temperature = Some(3.5);
        assert!(cfg.validate().is_err());
    }
}
