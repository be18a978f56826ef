//! Progress record kept under one Redis key

use async_trait::async_trait;
use redis::AsyncCommands;

use super::store::ProgressStore;
use crate::config::RedisConfig;
use crate::errors::Result;
use crate::errors::VecMigrateError;

const PROGRESS_KEY: &str = "migration:progress";

#[derive(Clone)]
pub struct RedisProgressStore {
    client: redis::Client,
    key: String,
}

impl RedisProgressStore {
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| VecMigrateError::Redis(format!("Redis open error: {e}")))?;
        Ok(Self {
            client,
            key: format!("{}{}", config.namespace, PROGRESS_KEY),
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis connect error: {e}")))
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn write_document(&self, document: serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(&document)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(&self.key, json)
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis SET error: {e}")))?;
        Ok(())
    }

    async fn read_document(&self) -> Result<Option<serde_json::Value>> {
        let mut conn = self.connection().await?;
        let val: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis GET error: {e}")))?;
        match val {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| VecMigrateError::CorruptProgress(e.to_string())),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(&self.key)
            .await
            .map_err(|e| VecMigrateError::Redis(format!("Redis DEL error: {e}")))?;
        Ok(())
    }
}
