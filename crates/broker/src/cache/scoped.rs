use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use svckit_core::{ServiceError, ServiceResult};

use super::store::CacheStore;

/// Store wrapper that owns a key namespace: every key is stored as
/// `{prefix}_{key}`, every write carries the configured TTL, and values are
/// JSON (de)serialized.
///
/// A stored value that no longer parses is reported as a miss with a
/// warning rather than an error, so one corrupt record cannot wedge its
/// consumers.
pub struct ScopedCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Option<Duration>,
}

impl ScopedCache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl: ttl_seconds.map(Duration::from_secs),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key)
    }

    fn parse<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, "stored value is not valid JSON: {e}");
                None
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> ServiceResult<Option<T>> {
        match self.store.get(&self.full_key(key)).await? {
            Some(raw) => Ok(self.parse(key, &raw)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> ServiceResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;
        self.store.set(&self.full_key(key), &raw, self.ttl).await
    }

    pub async fn delete(&self, key: &str) -> ServiceResult<bool> {
        self.store.delete(&self.full_key(key)).await
    }

    /// Fetch several records at once; unparseable or missing records come
    /// back as `None` in their slot.
    pub async fn get_multiple<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> ServiceResult<Vec<Option<T>>> {
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let raws = self.store.get_multiple(&full_keys).await?;
        Ok(keys
            .iter()
            .zip(raws)
            .map(|(key, raw)| raw.and_then(|raw| self.parse(key, &raw)))
            .collect())
    }

    /// Keys in this namespace matching `pattern`, with the namespace prefix
    /// stripped off.
    pub async fn search(&self, pattern: &str) -> ServiceResult<Vec<String>> {
        let keys = self.store.search(&self.full_key(pattern)).await?;
        let prefix = format!("{}_", self.prefix);
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(String::from)
            .collect())
    }

    /// Delete every key in this namespace matching `pattern`; returns how
    /// many were removed.
    pub async fn delete_keys(&self, pattern: &str) -> ServiceResult<usize> {
        let keys = self.search(pattern).await?;
        let mut removed = 0;
        for key in &keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use serde_json::{json, Value};

    fn scoped() -> (Arc<MemoryStore>, ScopedCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ScopedCache::new(store.clone(), "ns", Some(3600));
        (store, cache)
    }

    #[tokio::test]
    async fn keys_are_prefixed_with_the_namespace() {
        let (store, cache) = scoped();
        cache.set("k", &json!({"v": 1})).await.unwrap();

        assert_eq!(
            store.get("ns_k").await.unwrap(),
            Some("{\"v\":1}".to_string())
        );
        assert_eq!(
            cache.get::<Value>("k").await.unwrap(),
            Some(json!({"v": 1}))
        );
    }

    #[tokio::test]
    async fn search_strips_the_namespace_prefix() {
        let (_, cache) = scoped();
        cache.set("job_a", &json!(1)).await.unwrap();
        cache.set("job_b", &json!(2)).await.unwrap();
        cache.set("other", &json!(3)).await.unwrap();

        assert_eq!(
            cache.search("job_*").await.unwrap(),
            vec!["job_a".to_string(), "job_b".to_string()]
        );
    }

    #[tokio::test]
    async fn corrupt_records_read_as_misses() {
        let (store, cache) = scoped();
        store.set("ns_bad", "not json", None).await.unwrap();
        assert_eq!(cache.get::<Value>("bad").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_keys_removes_the_matching_namespace_slice() {
        let (_, cache) = scoped();
        cache.set("job_a", &json!(1)).await.unwrap();
        cache.set("job_b", &json!(2)).await.unwrap();
        cache.set("keep", &json!(3)).await.unwrap();

        assert_eq!(cache.delete_keys("job_*").await.unwrap(), 2);
        assert_eq!(cache.get::<Value>("job_a").await.unwrap(), None);
        assert_eq!(cache.get::<Value>("keep").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn get_multiple_preserves_slot_order() {
        let (_, cache) = scoped();
        cache.set("a", &json!(1)).await.unwrap();
        cache.set("c", &json!(3)).await.unwrap();

        let values: Vec<Option<Value>> = cache
            .get_multiple(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(json!(1)), None, Some(json!(3))]);
    }
}
