use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use svckit_core::{CacheConfig, ServiceError, ServiceResult};

use super::store::CacheStore;

/// Redis-backed store using the multiplexed connection manager.
pub struct RedisStore {
    client: Arc<redis::Client>,
}

impl RedisStore {
    /// Open the client and verify the server answers a PING.
    pub async fn connect(config: &CacheConfig) -> ServiceResult<Self> {
        let client = redis::Client::open(config.redis_url.clone())
            .map_err(|e| ServiceError::cache_error(e.to_string()))?;

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))?;

        info!("connected to cache store at {}", config.redis_url);

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn connection(&self) -> ServiceResult<redis::aio::ConnectionManager> {
        self.client
            .get_connection_manager()
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> ServiceResult<Option<String>> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> ServiceResult<()> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let _: () = redis::cmd("SETEX")
                    .arg(key)
                    .arg(ttl.as_secs())
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| ServiceError::cache_error(e.to_string()))?;
            }
            None => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| ServiceError::cache_error(e.to_string()))?;
            }
        }
        debug!("cache SET {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ServiceResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn get_multiple(&self, keys: &[String]) -> ServiceResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::cache_error(e.to_string()))
    }

    async fn search(&self, pattern: &str) -> ServiceResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        // SCAN instead of KEYS: bounded round-trips, no server-side stall.
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| ServiceError::cache_error(e.to_string()))?;

            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(keys)
    }
}
