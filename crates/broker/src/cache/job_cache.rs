use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use svckit_core::utils::random_uuid;
use svckit_core::{JobRecord, JobStatus, ServiceResult};

use super::scoped::ScopedCache;
use super::store::CacheStore;

/// Namespace prefix for job records in the shared store.
pub const JOB_NAMESPACE: &str = "u_jobs";

/// Jobs expire an hour after their last write; an abandoned job disappears
/// instead of lingering as PENDING forever.
pub const JOB_TTL_SECONDS: u64 = 3600;

/// Store-backed tracker for multi-step distributed jobs.
///
/// A job is one record keyed by an opaque job key; children of a parent job
/// live under keys prefixed with `{parent}_`, forming a one-level tree. The
/// parent aggregate is pull-based: nothing watches the children, the last
/// child to finish is expected to call [`JobCache::check_set_parent_job`].
pub struct JobCache {
    cache: ScopedCache,
}

impl JobCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            cache: ScopedCache::new(store, JOB_NAMESPACE, Some(JOB_TTL_SECONDS)),
        }
    }

    /// Create a PENDING job under a fresh key and return the key. With a
    /// `parent_key` the new job is namespaced as that parent's child.
    pub async fn create_job(&self, parent_key: Option<&str>) -> ServiceResult<String> {
        let mut key = random_uuid();
        if let Some(parent) = parent_key {
            key = format!("{parent}_{key}");
        }
        self.cache.set(&key, &JobRecord::pending()).await?;
        debug!(job_key = %key, "job created");
        Ok(key)
    }

    /// Overwrite the record at `key` with `{status, data}`. Prior data is
    /// not merged; this is a full replace.
    pub async fn set_progress(
        &self,
        key: &str,
        status: JobStatus,
        data: Option<Value>,
    ) -> ServiceResult<()> {
        self.cache.set(key, &JobRecord::new(status, data)).await
    }

    pub async fn check_job(&self, key: &str) -> ServiceResult<Option<JobRecord>> {
        self.cache.get(key).await
    }

    pub async fn delete_job(&self, key: &str) -> ServiceResult<bool> {
        self.cache.delete(key).await
    }

    /// Aggregate a parent from its children, if the parent still exists.
    ///
    /// All children COMPLETE: the parent becomes `(status, data)`. Any child
    /// FAILED: the parent becomes FAILED with no data. Otherwise the parent
    /// is left untouched; no intermediate state is inferred. A missing or
    /// expired child counts as neither complete nor failed.
    pub async fn check_set_parent_job(
        &self,
        key: &str,
        status: JobStatus,
        data: Option<Value>,
    ) -> ServiceResult<()> {
        if self.check_job(key).await?.is_none() {
            debug!(job_key = %key, "parent job not found, skipping aggregation");
            return Ok(());
        }

        let child_keys = self.cache.search(&format!("{key}_*")).await?;
        let children: Vec<Option<JobRecord>> = self.cache.get_multiple(&child_keys).await?;

        let all_complete = children
            .iter()
            .all(|c| matches!(c, Some(r) if r.status == JobStatus::Complete));
        let any_failed = children
            .iter()
            .any(|c| matches!(c, Some(r) if r.status == JobStatus::Failed));

        if all_complete {
            self.set_progress(key, status, data).await
        } else if any_failed {
            self.set_progress(key, JobStatus::Failed, None).await
        } else {
            Ok(())
        }
    }
}
