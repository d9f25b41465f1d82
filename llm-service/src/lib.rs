//! Shared LLM boundary with two active profiles: **generation** and **embedding**.
//!
//! The crate wraps the external model providers (local Ollama, OpenAI) behind
//! a single service type, [`profiles::LlmProfiles`]. Everything network-facing
//! lives here: HTTP clients with explicit timeouts, unified error mapping with
//! a transient/permanent split, and lightweight health probes.
//!
//! Construct once, wrap in `Arc`, and pass clones to dependents.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod profiles;
pub mod services;
pub mod telemetry;

pub use config::{model_config::ModelConfig, provider::LlmProvider};
pub use error_handler::{LlmServiceError, Result};
pub use profiles::LlmProfiles;
