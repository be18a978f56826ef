//! Google Generative Language `batchEmbedContents`

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
struct BatchRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

pub struct GoogleProvider {
    settings: ProviderSettings,
    client: Client,
}

impl GoogleProvider {
    #[must_use]
    pub const fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl EmbeddingProvider for GoogleProvider {
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
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("google API key not provided".to_string()))?;

        let model_path = format!("models/{}", self.settings.model);
        let url = join_url(
            &self.settings.endpoint,
            &format!("{model_path}:batchEmbedContents"),
        );
        debug!("Calling Google embeddings API: {} items", texts.len());

        let body = BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model_path.clone(),
                    content: Content {
                        parts: [Part { text }],
                    },
                })
                .collect(),
        };

        let request = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body);

        let response: BatchResponse = send_json(self.settings.name, request).await?;
        let vectors: Vec<Vec<f32>> = response.embeddings.into_iter().map(|e| e.values).collect();
        expect_vectors(self.settings.name, &vectors, texts.len())?;

        // The batch endpoint reports no usage
        Ok(ProviderOutput {
            vectors,
            tokens_used: texts.iter().map(|t| estimate_tokens(t)).sum(),
        })
    }
}
