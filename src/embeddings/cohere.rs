//! Cohere `/v1/embed`

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
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    billed_units: Option<BilledUnits>,
}

#[derive(Deserialize)]
struct BilledUnits {
    #[serde(default)]
    input_tokens: Option<u64>,
}

pub struct CohereProvider {
    settings: ProviderSettings,
    client: Client,
}

impl CohereProvider {
    #[must_use]
    pub const fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
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
            .ok_or_else(|| ProviderError::Fatal("cohere API key not provided".to_string()))?;

        let url = join_url(&self.settings.endpoint, "embed");
        debug!("Calling Cohere embeddings API: {} items", texts.len());

        let request = self.client.post(&url).bearer_auth(api_key).json(&EmbedRequest {
            texts,
            model: &self.settings.model,
            input_type: "search_document",
            truncate: "END",
        });

        let response: EmbedResponse = send_json(self.settings.name, request).await?;
        expect_vectors(self.settings.name, &response.embeddings, texts.len())?;

        let billed = response
            .meta
            .and_then(|m| m.billed_units)
            .and_then(|b| b.input_tokens);

        Ok(ProviderOutput {
            vectors: response.embeddings,
            tokens_used: billed.unwrap_or_else(|| texts.iter().map(|t| estimate_tokens(t)).sum()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_billed_units() {
        let body = r#"{
            "id": "abc",
            "embeddings": [[0.1, 0.2], [0.3, 0.4]],
            "texts": ["a", "b"],
            "meta": {"api_version": {"version": "1"}, "billed_units": {"input_tokens": 7}}
        }"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        let billed = parsed.meta.and_then(|m| m.billed_units).and_then(|b| b.input_tokens);
        assert_eq!(billed, Some(7));
    }

    #[test]
    fn test_response_without_meta() {
        let parsed: EmbedResponse = serde_json::from_str(r#"{"embeddings": [[1.0]]}"#).unwrap();
        assert!(parsed.meta.is_none());
    }
}
