//! Content-hash keyed embedding cache

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::errors::Result;
use crate::errors::VecMigrateError;

/// Vectors previously computed for identical text under the same model
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, model: &str, content_hash: &str) -> Result<Option<Vec<f32>>>;

    async fn put(&self, model: &str, content_hash: &str, vector: &[f32]) -> Result<()>;
}

fn cache_key(model: &str, content_hash: &str) -> String {
    format!("embedding:{model}:{content_hash}")
}

/// Redis-backed cache with a per-key expiry
#[derive(Clone)]
pub struct RedisEmbeddingCache {
    client: redis::Client,
    namespace: String,
    ttl: Duration,
}

impl RedisEmbeddingCache {
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| VecMigrateError::Redis(format!("Redis open error: {e}")))?;

        Ok(Self {
            client,
            namespace: config.namespace.clone(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
        })
    }

    fn key(&self, model: &str, content_hash: &str) -> String {
        format!("{}{}", self.namespace, cache_key(model, content_hash))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis connect error: {e}")))
    }
}

#[async_trait]
impl EmbeddingCache for RedisEmbeddingCache {
    async fn get(&self, model: &str, content_hash: &str) -> Result<Option<Vec<f32>>> {
        let mut conn = self.connection().await?;
        let val: Option<String> = conn
            .get(self.key(model, content_hash))
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis GET error: {e}")))?;
        match val {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, model: &str, content_hash: &str, vector: &[f32]) -> Result<()> {
        let k = self.key(model, content_hash);
        let json = serde_json::to_string(vector)?;
        let mut conn = self.connection().await?;
        redis::pipe()
            .set(&k, json)
            .ignore()
            .expire(&k, self.ttl.as_secs() as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis SET/EXPIRE error: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process cache for single-run use and tests
pub struct MemoryEmbeddingCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl MemoryEmbeddingCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl EmbeddingCache for MemoryEmbeddingCache {
    async fn get(&self, model: &str, content_hash: &str) -> Result<Option<Vec<f32>>> {
        let key = cache_key(model, content_hash);
        let hit = self.entries.get(&key).map(|e| e.value().clone());
        match hit {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(&key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.vector)),
            None => Ok(None),
        }
    }

    async fn put(&self, model: &str, content_hash: &str, vector: &[f32]) -> Result<()> {
        self.entries.insert(
            cache_key(model, content_hash),
            CacheEntry {
                vector: vector.to_vec(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_hit_and_model_scoping() {
        let cache = MemoryEmbeddingCache::new(Duration::from_secs(60));
        cache.put("m1", "abc", &[0.1, 0.2]).await.unwrap();

        assert_eq!(cache.get("m1", "abc").await.unwrap(), Some(vec![0.1, 0.2]));
        assert_eq!(cache.get("m2", "abc").await.unwrap(), None);
        assert_eq!(cache.get("m1", "def").await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryEmbeddingCache::new(Duration::ZERO);
        cache.put("m", "abc", &[1.0]).await.unwrap();
        assert_eq!(cache.get("m", "abc").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_redis_key_is_namespaced() {
        let cache = RedisEmbeddingCache::connect(&RedisConfig::default()).unwrap();
        assert_eq!(
            cache.key("text-embedding-3-small", "ff00"),
            "vecmigrate:embedding:text-embedding-3-small:ff00"
        );
    }

    #[tokio::test]
    #[ignore = "Requires a running Redis server"]
    async fn test_redis_round_trip() {
        let cache = RedisEmbeddingCache::connect(&RedisConfig::default()).unwrap();
        cache.put("test-model", "deadbeef", &[0.5, 0.25]).await.unwrap();
        let hit = cache.get("test-model", "deadbeef").await.unwrap();
        assert_eq!(hit, Some(vec![0.5, 0.25]));
    }
}
