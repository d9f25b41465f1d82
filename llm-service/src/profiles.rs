//! Shared LLM service with two active profiles: `generation` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - Provides convenience methods to generate a completion and to compute
//!   embeddings.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::RwLock;

use crate::{
    config::{model_config::ModelConfig, provider::LlmProvider},
    error_handler::LlmServiceError,
    health_service::{HealthService, HealthStatus},
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Shared service that manages the **generation** and **embedding** profiles.
///
/// Internally caches Ollama/OpenAI clients keyed by their configuration to
/// avoid recreating HTTP clients on each call.
pub struct LlmProfiles {
    generation: ModelConfig,
    embedding: ModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,

    health: HealthService,
}

impl LlmProfiles {
    /// Creates a new service with both profiles.
    ///
    /// - `generation`: model used to produce PromQL candidates.
    /// - `embedding`: model used to vectorize text for retrieval.
    /// - `health_timeout_secs`: optional timeout for the health checker.
    ///
    /// # Errors
    /// Returns [`LlmServiceError`] if either config fails validation or the
    /// health checker cannot be built.
    pub fn new(
        generation: ModelConfig,
        embedding: ModelConfig,
        health_timeout_secs: Option<u64>,
    ) -> Result<Self, LlmServiceError> {
        generation.validate()?;
        embedding.validate()?;

        Ok(Self {
            generation,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            health: HealthService::new(health_timeout_secs)?,
        })
    }

    /// Generates text using the **generation** profile.
    ///
    /// # Arguments
    /// - `prompt`: input text prompt.
    /// - `system`: optional system instruction.
    ///
    /// # Errors
    /// Returns [`LlmServiceError`] if generation fails.
    pub async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, LlmServiceError> {
        match self.generation.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.generation).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.generation).await?;
                cli.generate(prompt, system).await
            }
        }
    }

    /// Generates text using an ad-hoc override of the generation profile.
    ///
    /// Keeps provider, endpoint and credentials, but swaps the sampling
    /// knobs. Used by callers that need per-request `temperature`, token
    /// limits, or stop sequences.
    pub async fn complete_with(
        &self,
        prompt: &str,
        system: Option<&str>,
        overrides: &SamplingOverrides,
    ) -> Result<String, LlmServiceError> {
        let mut cfg = self.generation.clone();
        if let Some(t) = overrides.temperature {
            cfg.temperature = Some(t);
        }
        if let Some(m) = overrides.max_tokens {
            cfg.max_tokens = Some(m);
        }
        if let Some(stop) = &overrides.stop {
            cfg.stop = stop.clone();
        }
        cfg.validate()?;

        match cfg.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&cfg).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&cfg).await?;
                cli.generate(prompt, system).await
            }
        }
    }

    /// Computes embeddings using the **embedding** profile.
    ///
    /// # Errors
    /// Returns [`LlmServiceError`] if embedding fails.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, LlmServiceError> {
        match self.embedding.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.embedding).await?;
                cli.embeddings(input).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.embedding).await?;
                cli.embeddings(input).await
            }
        }
    }

    /// Returns a health snapshot for all distinct profiles.
    ///
    /// If the embedding profile equals the generation profile, it is checked
    /// only once.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = Vec::<ModelConfig>::with_capacity(2);
        list.push(self.generation.clone());
        if self.embedding != self.generation {
            list.push(self.embedding.clone());
        }
        self.health.check_many(&list).await
    }

    /// Returns references to the current profiles `(generation, embedding)`.
    pub fn profiles(&self) -> (&ModelConfig, &ModelConfig) {
        (&self.generation, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn get_or_init_ollama(
        &self,
        cfg: &ModelConfig,
    ) -> Result<Arc<OllamaService>, LlmServiceError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(
        &self,
        cfg: &ModelConfig,
    ) -> Result<Arc<OpenAiService>, LlmServiceError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Per-request sampling overrides for [`LlmProfiles::complete_with`].
#[derive(Clone, Debug, Default)]
pub struct SamplingOverrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
    sampling: String,
}

impl From<&ModelConfig> for ClientKey {
    fn from(cfg: &ModelConfig) -> Self {
        // Sampling knobs are baked into the underlying client request
        // bodies, so they are part of the identity too.
        let sampling = format!(
            "{:?}/{:?}/{:?}/{:?}",
            cfg.temperature, cfg.top_p, cfg.max_tokens, cfg.stop
        );
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
            sampling,
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
            && self.sampling == other.sampling
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
        self.sampling.hash(state);
    }
}
