//! OpenAI-compatible `/embeddings` endpoint (OpenAI, Voyage, Jina)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::client::expect_vectors;
use super::client::join_url;
use super::client::send_json;
use super::provider::EmbeddingProvider;
use super::provider::ProviderOutput;
use super::provider::ProviderSettings;
use super::text_preprocessing::estimate_tokens;
use crate::errors::ProviderError;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

pub struct OpenAiCompatibleProvider {
    settings: ProviderSettings,
    client: Client,
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub const fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.settings.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.settings.max_batch_size
    }

    fn price_per_1k_tokens(&self) -> f64 {
        self.settings.price_per_1k_tokens
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderOutput, ProviderError> {
        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            ProviderError::Fatal(format!("{} API key not provided", self.settings.name))
        })?;

        let url = join_url(&self.settings.endpoint, "embeddings");
        debug!("Calling {} embeddings API: {} items", self.settings.name, texts.len());

        let request = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&EmbeddingsRequest {
                input: texts,
                model: &self.settings.model,
            });

        let mut response: EmbeddingsResponse = send_json(self.settings.name, request).await?;
        response.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        expect_vectors(self.settings.name, &vectors, texts.len())?;

        let tokens_used = response
            .usage
            .map_or_else(|| texts.iter().map(|t| estimate_tokens(t)).sum(), |u| u.total_tokens);

        Ok(ProviderOutput {
            vectors,
            tokens_used,
        })
    }
}
