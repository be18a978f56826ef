//! Provider lookup table
//!
//! Each provider is registered once with its defaults; the configured name picks
//! the entry at startup. Credentials and base URLs come from `[embeddings]` or
//! from `<PROVIDER>_API_KEY` / `<PROVIDER>_BASE_URL`.

use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use super::client::build_http_client;
use super::cohere::CohereProvider;
use super::google::GoogleProvider;
use super::local::LocalProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiCompatibleProvider;
use super::provider::EmbeddingProvider;
use super::provider::ProviderSettings;
use crate::config::EmbeddingsConfig;
use crate::errors::ProviderError;
use crate::errors::Result;
use crate::errors::VecMigrateError;

type BuildFn = fn(ProviderSettings, Client) -> Arc<dyn EmbeddingProvider>;

/// Static description of one provider
pub struct ProviderSpec {
    pub name: &'static str,
    pub default_model: &'static str,
    pub default_base_url: &'static str,
    pub requires_api_key: bool,
    /// Per-request sub-batch cap
    pub max_batch_size: usize,
    dimension_for: fn(&str) -> usize,
    price_for: fn(&str) -> f64,
    build: BuildFn,
}

impl ProviderSpec {
    /// Dimension the provider produces for `model`
    #[must_use]
    pub fn dimension(&self, model: &str) -> usize {
        (self.dimension_for)(model)
    }

    #[must_use]
    pub fn price_per_1k_tokens(&self, model: &str) -> f64 {
        (self.price_for)(model)
    }
}

fn openai_dimension(model: &str) -> usize {
    if model.contains("3-large") {
        3072
    } else {
        1536
    }
}

fn openai_price(model: &str) -> f64 {
    if model.contains("3-large") {
        0.000_13
    } else if model.contains("3-small") {
        0.000_02
    } else {
        0.000_1
    }
}

fn cohere_dimension(model: &str) -> usize {
    if model.contains("light") {
        384
    } else {
        1024
    }
}

fn voyage_dimension(model: &str) -> usize {
    if model == "voyage-2" || model.contains("lite") {
        1024
    } else {
        1536
    }
}

fn google_build(s: ProviderSettings, c: Client) -> Arc<dyn EmbeddingProvider> {
    Arc::new(GoogleProvider::new(s, c))
}

fn cohere_build(s: ProviderSettings, c: Client) -> Arc<dyn EmbeddingProvider> {
    Arc::new(CohereProvider::new(s, c))
}

fn ollama_build(s: ProviderSettings, c: Client) -> Arc<dyn EmbeddingProvider> {
    Arc::new(OllamaProvider::new(s, c))
}

fn openai_compatible_build(s: ProviderSettings, c: Client) -> Arc<dyn EmbeddingProvider> {
    Arc::new(OpenAiCompatibleProvider::new(s, c))
}

fn local_build(s: ProviderSettings, _c: Client) -> Arc<dyn EmbeddingProvider> {
    Arc::new(LocalProvider::new(s.dimension))
}

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        default_model: "text-embedding-3-small",
        default_base_url: "https://api.openai.com/v1",
        requires_api_key: true,
        max_batch_size: 100,
        dimension_for: openai_dimension,
        price_for: openai_price,
        build: openai_compatible_build,
    },
    ProviderSpec {
        name: "google",
        default_model: "text-embedding-004",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        requires_api_key: true,
        max_batch_size: 100,
        dimension_for: |_| 768,
        price_for: |_| 0.0,
        build: google_build,
    },
    ProviderSpec {
        name: "cohere",
        default_model: "embed-english-v3.0",
        default_base_url: "https://api.cohere.ai/v1",
        requires_api_key: true,
        max_batch_size: 10,
        dimension_for: cohere_dimension,
        price_for: |_| 0.000_1,
        build: cohere_build,
    },
    ProviderSpec {
        name: "voyage",
        default_model: "voyage-large-2",
        default_base_url: "https://api.voyageai.com/v1",
        requires_api_key: true,
        max_batch_size: 8,
        dimension_for: voyage_dimension,
        price_for: |_| 0.000_12,
        build: openai_compatible_build,
    },
    ProviderSpec {
        name: "jina",
        default_model: "jina-embeddings-v2-base-en",
        default_base_url: "https://api.jina.ai/v1",
        requires_api_key: true,
        max_batch_size: 1,
        dimension_for: |_| 768,
        price_for: |_| 0.000_02,
        build: openai_compatible_build,
    },
    ProviderSpec {
        name: "ollama",
        default_model: "nomic-embed-text",
        default_base_url: "http://localhost:11434",
        requires_api_key: false,
        max_batch_size: 1,
        dimension_for: |_| 768,
        price_for: |_| 0.0,
        build: ollama_build,
    },
    ProviderSpec {
        name: "local",
        default_model: super::local::LOCAL_MODEL,
        default_base_url: "",
        requires_api_key: false,
        max_batch_size: usize::MAX,
        dimension_for: |_| 1536,
        price_for: |_| 0.0,
        build: local_build,
    },
];

/// Find a registered provider by name (case-insensitive)
#[must_use]
pub fn lookup(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Names of every registered provider
#[must_use]
pub fn provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}

/// Vector dimension the configured provider will produce, without connecting to it
pub fn configured_dimension(config: &EmbeddingsConfig) -> Result<usize> {
    if let Some(dimension) = config.dimension {
        return Ok(dimension);
    }
    let spec = lookup(&config.provider).ok_or_else(|| {
        VecMigrateError::ConfigError(format!("Unknown embedding provider '{}'", config.provider))
    })?;
    let model = if config.model.is_empty() {
        spec.default_model
    } else {
        &config.model
    };
    Ok(spec.dimension(model))
}

/// Construct the configured provider using the process environment
pub fn create_provider(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    create_provider_with_env(config, |key| std::env::var(key).ok())
}

/// Construct the configured provider, resolving variables through `env`
///
/// Missing credentials fail here, before any record is processed.
pub fn create_provider_with_env<F>(
    config: &EmbeddingsConfig,
    env: F,
) -> Result<Arc<dyn EmbeddingProvider>>
where
    F: Fn(&str) -> Option<String>,
{
    let spec = lookup(&config.provider).ok_or_else(|| {
        VecMigrateError::ConfigError(format!(
            "Unknown embedding provider '{}'. Available providers: {:?}",
            config.provider,
            provider_names()
        ))
    })?;

    let prefix = spec.name.to_ascii_uppercase();
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env(&format!("{prefix}_API_KEY")).filter(|k| !k.is_empty()));

    if spec.requires_api_key && api_key.is_none() {
        return Err(ProviderError::Fatal(format!(
            "missing credentials for {}: set embeddings.api_key or {prefix}_API_KEY",
            spec.name
        ))
        .into());
    }

    let endpoint = config
        .endpoint
        .clone()
        .or_else(|| env(&format!("{prefix}_BASE_URL")))
        .unwrap_or_else(|| spec.default_base_url.to_string());

    let model = if config.model.is_empty() {
        spec.default_model.to_string()
    } else {
        config.model.clone()
    };

    let settings = ProviderSettings {
        name: spec.name,
        dimension: config.dimension.unwrap_or_else(|| spec.dimension(&model)),
        price_per_1k_tokens: spec.price_per_1k_tokens(&model),
        max_batch_size: spec.max_batch_size,
        model,
        endpoint,
        api_key,
    };

    info!(
        provider = spec.name,
        model = %settings.model,
        dimension = settings.dimension,
        "Embedding provider configured"
    );

    let client = build_http_client(config.request_timeout_secs)?;
    Ok((spec.build)(settings, client))
}
