//! Embedding generation
//!
//! Providers implement [`EmbeddingProvider`] and are selected by name from the
//! [`registry`]. The [`ProviderAdapter`] wraps the configured provider with the
//! content-hash cache, per-provider sub-batching, transient retries and the
//! local pseudo-embedding fallback.
//!
//! # Examples
//!
//! ```rust,no_run
//! use vecmigrate::config::AppConfig;
//! use vecmigrate::embeddings::build_adapter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let adapter = build_adapter(&config)?;
//!
//!     let embedded = adapter.embed(&["Hello, world!".to_string()]).await?;
//!     println!("Generated embedding with {} dimensions", embedded[0].vector.len());
//!
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod client;
pub mod cohere;
pub mod google;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod registry;
pub mod text_preprocessing;

use std::sync::Arc;
use std::time::Duration;

pub use adapter::EmbeddedText;
pub use adapter::EmbeddingSource;
pub use adapter::ProviderAdapter;
pub use cache::EmbeddingCache;
pub use cache::MemoryEmbeddingCache;
pub use cache::RedisEmbeddingCache;
pub use provider::EmbeddingProvider;
pub use provider::ProviderOutput;

use crate::config::AppConfig;
use crate::config::CacheBackend;
use crate::errors::Result;

/// Build the embedding cache selected by `[migration].cache_backend`
pub fn build_cache(config: &AppConfig) -> Result<Option<Arc<dyn EmbeddingCache>>> {
    let ttl = Duration::from_secs(config.redis.cache_ttl_secs);
    Ok(match config.migration.cache_backend {
        CacheBackend::Redis => Some(Arc::new(RedisEmbeddingCache::connect(&config.redis)?)),
        CacheBackend::Memory => Some(Arc::new(MemoryEmbeddingCache::new(ttl))),
        CacheBackend::None => None,
    })
}

/// Build the configured provider behind an adapter with cache and retry policy
///
/// Fails with a fatal error when the provider's credentials are missing.
pub fn build_adapter(config: &AppConfig) -> Result<ProviderAdapter> {
    let provider = registry::create_provider(&config.embeddings)?;
    let mut adapter = ProviderAdapter::new(provider).with_retries(
        config.embeddings.max_retries,
        Duration::from_millis(config.embeddings.retry_base_delay_ms),
    );
    if let Some(cache) = build_cache(config)? {
        adapter = adapter.with_cache(cache);
    }
    Ok(adapter)
}
