//! Provider adapter: cache lookup, sub-batching, retries and the local fallback

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::cache::EmbeddingCache;
use super::local::pseudo_embedding;
use super::provider::EmbeddingProvider;
use super::text_preprocessing::content_hash;
use crate::errors::ProviderError;

/// Where a vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Provider,
    Cache,
    Fallback,
}

/// One embedded text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedText {
    pub vector: Vec<f32>,
    pub tokens_used: u64,
    pub model_used: String,
    pub source: EmbeddingSource,
}

pub struct ProviderAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn EmbeddingCache>>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ProviderAdapter {
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: None,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Dimension of every vector this adapter returns, fallback included
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Estimated USD cost of `tokens` on the configured provider
    #[must_use]
    pub fn cost_of(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.provider.price_per_1k_tokens()
    }

    /// Model label stored for placeholder vectors
    #[must_use]
    pub fn fallback_model(&self) -> String {
        format!("{}-fallback", self.provider.name())
    }

    /// Start a batch; once the provider hits a quota or rate limit the session
    /// serves local vectors for the rest of the batch
    #[must_use]
    pub fn session(&self, cancel: CancellationToken) -> AdapterSession<'_> {
        AdapterSession {
            adapter: self,
            fallback_reason: None,
            cancel,
        }
    }

    /// Embed `texts` as one batch
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddedText>, ProviderError> {
        self.session(CancellationToken::new()).embed(texts).await
    }

    fn fallback(&self, text: &str) -> EmbeddedText {
        EmbeddedText {
            vector: pseudo_embedding(text, self.dimension()),
            tokens_used: 0,
            model_used: self.fallback_model(),
            source: EmbeddingSource::Fallback,
        }
    }

    async fn cache_get(&self, hash: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        match cache.get(self.model(), hash).await {
            Ok(hit) => hit.filter(|v| v.len() == self.dimension()),
            Err(e) => {
                warn!("Embedding cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn cache_put(&self, hash: &str, vector: &[f32]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(self.model(), hash, vector).await {
                warn!("Embedding cache write failed: {}", e);
            }
        }
    }

    /// Reject responses that cannot be stored; a wrong vector size is fatal
    fn check_output(
        &self,
        output: &super::provider::ProviderOutput,
        submitted: usize,
    ) -> Result<(), ProviderError> {
        if output.vectors.len() != submitted {
            return Err(ProviderError::Transient(format!(
                "{} returned {} embeddings for {submitted} texts",
                self.provider.name(),
                output.vectors.len()
            )));
        }
        let expected = self.dimension();
        if let Some(bad) = output.vectors.iter().find(|v| v.len() != expected) {
            return Err(ProviderError::Fatal(format!(
                "{} model {} returned {}-dimensional vectors, expected {expected}",
                self.provider.name(),
                self.provider.model(),
                bad.len()
            )));
        }
        Ok(())
    }

    /// One provider request with linear backoff on transient failures
    async fn call_with_retry(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<super::provider::ProviderOutput, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.embed(texts).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_base_delay * attempt;
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        "Transient embedding failure, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Per-batch view of the adapter carrying the fallback latch
pub struct AdapterSession<'a> {
    adapter: &'a ProviderAdapter,
    fallback_reason: Option<String>,
    cancel: CancellationToken,
}

impl AdapterSession<'_> {
    /// Reason the session switched to local vectors, if it did
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Embed `texts`, returning one result per input in order
    ///
    /// Cache hits never reach the provider. Misses are sent in sub-batches no
    /// larger than the provider's cap. `RateLimited` and `QuotaExceeded` latch
    /// the fallback; `Fatal` and exhausted `Transient` failures are returned.
    pub async fn embed(&mut self, texts: &[String]) -> Result<Vec<EmbeddedText>, ProviderError> {
        let adapter = self.adapter;
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let mut results: Vec<Option<EmbeddedText>> = vec![None; texts.len()];
        let mut misses = Vec::new();

        for (i, hash) in hashes.iter().enumerate() {
            match adapter.cache_get(hash).await {
                Some(vector) => {
                    debug!("Embedding cache hit for {}", hash);
                    results[i] = Some(EmbeddedText {
                        vector,
                        tokens_used: 0,
                        model_used: adapter.model().to_string(),
                        source: EmbeddingSource::Cache,
                    });
                }
                None => misses.push(i),
            }
        }

        let cap = adapter.provider.max_batch_size().max(1);
        for chunk in misses.chunks(cap) {
            if self.fallback_reason.is_none() {
                let chunk_texts: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
                match adapter.call_with_retry(&chunk_texts, &self.cancel).await {
                    Ok(output) => {
                        adapter.check_output(&output, chunk.len())?;
                        let shares = split_tokens(output.tokens_used, chunk.len());
                        for ((&i, vector), tokens) in chunk.iter().zip(output.vectors).zip(shares) {
                            adapter.cache_put(&hashes[i], &vector).await;
                            results[i] = Some(EmbeddedText {
                                vector,
                                tokens_used: tokens,
                                model_used: adapter.model().to_string(),
                                source: EmbeddingSource::Provider,
                            });
                        }
                        continue;
                    }
                    Err(e) if e.triggers_fallback() => {
                        warn!(
                            provider = adapter.provider.name(),
                            "Switching to local pseudo-embeddings: {}", e
                        );
                        self.fallback_reason = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }

            for &i in chunk {
                results[i] = Some(adapter.fallback(&texts[i]));
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

/// Split a request's token count across its records so the shares sum to the total
fn split_tokens(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as u64;
    let base = total / n;
    let remainder = total % n;
    (0..n).map(|i| base + u64::from(i < remainder)).collect()
}
