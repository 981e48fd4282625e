//! Provider selection from configuration.
//!
//! The generative stage uses at most one provider. [`build_provider`] reads
//! the `llm.model` spec (`<provider>/<model>`) and returns `None` when no
//! model is configured.

use std::sync::Arc;

use tracing::info;

use crate::config::LlmConfig;

use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::{parse_provider_string, LlmProvider};

/// Provider selection errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is not in `<provider>/<model>` format.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// Unsupported provider type in spec prefix.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
    /// Required API credential missing for selected provider.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Missing credential key.
        key: String,
    },
}

/// Build the configured provider, or `None` when no model is configured.
///
/// # Errors
///
/// Returns [`RouterError`] when a model is configured but cannot be
/// instantiated.
pub fn build_provider(llm: &LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>, RouterError> {
    let Some(spec) = llm.model.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let (provider, model) = parse_provider_string(spec).map_err(|_| RouterError::InvalidModelSpec {
        spec: spec.to_owned(),
    })?;
    let instance = instantiate_provider(spec, provider, model, llm)?;
    info!(model = spec, "generative provider configured");
    Ok(Some(instance))
}

fn instantiate_provider(
    model_spec: &str,
    provider: &str,
    model: &str,
    llm: &LlmConfig,
) -> Result<Arc<dyn LlmProvider>, RouterError> {
    let require = |value: &Option<String>, key: &str| {
        value
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| RouterError::MissingCredential {
                provider: provider.to_owned(),
                key: key.to_owned(),
            })
    };

    match provider {
        "gemini" | "google" => {
            let key = require(&llm.gemini_api_key, "gemini_api_key")?;
            Ok(Arc::new(GeminiProvider::new(
                model_spec.to_owned(),
                model.to_owned(),
                key,
            )))
        }
        "anthropic" => {
            let key = require(&llm.anthropic_api_key, "anthropic_api_key")?;
            Ok(Arc::new(AnthropicProvider::new(
                model_spec.to_owned(),
                model.to_owned(),
                key,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            model_spec.to_owned(),
            model.to_owned(),
            llm.ollama_url.clone(),
        ))),
        other => Err(RouterError::UnsupportedProvider {
            provider: other.to_owned(),
        }),
    }
}
