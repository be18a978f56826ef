//! Ollama `/api/embeddings`, one prompt per request

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::client::join_url;
use super::client::send_json;
use super::provider::EmbeddingProvider;
use super::provider::ProviderOutput;
use super::provider::ProviderSettings;
use super::text_preprocessing::estimate_tokens;
use crate::errors::ProviderError;

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

pub struct OllamaProvider {
    settings: ProviderSettings,
    client: Client,
}

impl OllamaProvider {
    #[must_use]
    pub const fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
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
        1
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderOutput, ProviderError> {
        let url = join_url(&self.settings.endpoint, "api/embeddings");
        let mut vectors = Vec::with_capacity(texts.len());

        for text in texts {
            debug!("Calling Ollama embeddings API: {}", url);
            let request = self.client.post(&url).json(&OllamaRequest {
                model: &self.settings.model,
                prompt: text,
            });
            let response: OllamaResponse = send_json(self.settings.name, request).await?;
            if response.embedding.is_empty() {
                return Err(ProviderError::Transient(
                    "ollama returned an empty embedding".to_string(),
                ));
            }
            vectors.push(response.embedding);
        }

        Ok(ProviderOutput {
            vectors,
            tokens_used: texts.iter().map(|t| estimate_tokens(t)).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let parsed: OllamaResponse =
            serde_json::from_str(r#"{"embedding": [0.25, 0.5, 0.75]}"#).unwrap();
        assert_eq!(parsed.embedding.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let provider = OllamaProvider::new(
            ProviderSettings {
                name: "ollama",
                model: "nomic-embed-text".into(),
                // Port 9 (discard) is closed on test hosts
                endpoint: "http://127.0.0.1:9".into(),
                api_key: None,
                dimension: 768,
                max_batch_size: 1,
                price_per_1k_tokens: 0.0,
            },
            Client::new(),
        );
        let err = provider.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
