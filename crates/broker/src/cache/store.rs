use std::time::Duration;

use async_trait::async_trait;

use svckit_core::ServiceResult;

/// Minimal key-value surface the job tracker needs from a store.
///
/// Values are raw JSON strings; typed (de)serialization lives in
/// [`super::ScopedCache`]. Store unavailability surfaces as an error to the
/// caller; no retry is attempted at this level.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> ServiceResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> ServiceResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> ServiceResult<bool>;

    /// One slot per requested key, `None` for misses.
    async fn get_multiple(&self, keys: &[String]) -> ServiceResult<Vec<Option<String>>>;

    /// Keys matching a glob-style pattern (only a trailing `*` is required
    /// of implementations).
    async fn search(&self, pattern: &str) -> ServiceResult<Vec<String>>;
}
