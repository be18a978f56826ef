//! Uniform interface implemented once per embedding provider

use async_trait::async_trait;

use crate::errors::ProviderError;

/// Vectors for one request plus the tokens the provider billed for it
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub vectors: Vec<Vec<f32>>,
    pub tokens_used: u64,
}

/// Resolved settings shared by the HTTP providers
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: &'static str,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub max_batch_size: usize,
    pub price_per_1k_tokens: f64,
}

/// Black-box embedding provider: text in, vectors and usage out, or a typed failure
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Registry name (`openai`, `google`, ...)
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Dimensionality of the vectors this provider returns
    fn dimension(&self) -> usize;

    /// Largest number of texts accepted by a single request
    fn max_batch_size(&self) -> usize;

    /// USD per 1K tokens, used for cost estimation
    fn price_per_1k_tokens(&self) -> f64 {
        0.0
    }

    /// Embed `texts` in one request; `texts.len()` never exceeds `max_batch_size()`
    async fn embed(&self, texts: &[String]) -> Result<ProviderOutput, ProviderError>;
}
