use std::sync::Arc;

use serde_json::json;

use svckit_broker::{CacheStore, JobCache, MemoryStore, JOB_NAMESPACE};
use svckit_core::{JobStatus, ServiceResult};

fn cache() -> (Arc<MemoryStore>, JobCache) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), JobCache::new(store))
}

async fn statuses(cache: &JobCache, keys: &[&str]) -> ServiceResult<Vec<Option<JobStatus>>> {
    let mut out = Vec::new();
    for key in keys {
        out.push(cache.check_job(key).await?.map(|r| r.status));
    }
    Ok(out)
}

#[tokio::test]
async fn created_jobs_start_pending_under_the_job_namespace() {
    let (store, cache) = cache();
    let key = cache.create_job(None).await.unwrap();

    assert_eq!(key.len(), 32);
    let record = cache.check_job(&key).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.data, None);

    let raw = store.get(&format!("{JOB_NAMESPACE}_{key}")).await.unwrap();
    assert!(raw.is_some());
}

#[tokio::test]
async fn child_jobs_are_keyed_under_their_parent() {
    let (_, cache) = cache();
    let parent = cache.create_job(None).await.unwrap();
    let child = cache.create_job(Some(&parent)).await.unwrap();

    assert!(child.starts_with(&format!("{parent}_")));
    assert_eq!(
        cache.check_job(&child).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn set_progress_replaces_the_whole_record() {
    let (_, cache) = cache();
    let key = cache.create_job(None).await.unwrap();

    cache
        .set_progress(&key, JobStatus::InProgress, Some(json!({ "step": 1 })))
        .await
        .unwrap();
    cache
        .set_progress(&key, JobStatus::Complete, None)
        .await
        .unwrap();

    let record = cache.check_job(&key).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Complete);
    assert_eq!(record.data, None);
}

#[tokio::test]
async fn delete_job_removes_the_record() {
    let (_, cache) = cache();
    let key = cache.create_job(None).await.unwrap();

    assert!(cache.delete_job(&key).await.unwrap());
    assert!(cache.check_job(&key).await.unwrap().is_none());
    assert!(!cache.delete_job(&key).await.unwrap());
}

#[tokio::test]
async fn parent_completes_when_all_children_complete() {
    let (_, cache) = cache();
    let parent = cache.create_job(None).await.unwrap();
    let a = cache.create_job(Some(&parent)).await.unwrap();
    let b = cache.create_job(Some(&parent)).await.unwrap();

    cache
        .set_progress(&a, JobStatus::Complete, None)
        .await
        .unwrap();
    cache
        .set_progress(&b, JobStatus::Complete, None)
        .await
        .unwrap();
    cache
        .check_set_parent_job(&parent, JobStatus::Complete, Some(json!({ "total": 2 })))
        .await
        .unwrap();

    let record = cache.check_job(&parent).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Complete);
    assert_eq!(record.data, Some(json!({ "total": 2 })));
}

#[tokio::test]
async fn any_failed_child_fails_the_parent_without_data() {
    let (_, cache) = cache();
    let parent = cache.create_job(None).await.unwrap();
    let a = cache.create_job(Some(&parent)).await.unwrap();
    let b = cache.create_job(Some(&parent)).await.unwrap();

    cache
        .set_progress(&a, JobStatus::Complete, None)
        .await
        .unwrap();
    cache
        .set_progress(&b, JobStatus::Failed, Some(json!({ "reason": "x" })))
        .await
        .unwrap();
    cache
        .check_set_parent_job(&parent, JobStatus::Complete, Some(json!({ "total": 2 })))
        .await
        .unwrap();

    let record = cache.check_job(&parent).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.data, None);
}

#[tokio::test]
async fn parent_is_untouched_while_children_are_still_running() {
    let (_, cache) = cache();
    let parent = cache.create_job(None).await.unwrap();
    let a = cache.create_job(Some(&parent)).await.unwrap();
    let b = cache.create_job(Some(&parent)).await.unwrap();

    cache
        .set_progress(&a, JobStatus::Complete, None)
        .await
        .unwrap();
    cache
        .set_progress(&b, JobStatus::InProgress, None)
        .await
        .unwrap();
    cache
        .check_set_parent_job(&parent, JobStatus::Complete, None)
        .await
        .unwrap();

    let outcome = statuses(&cache, &[&parent]).await.unwrap();
    assert_eq!(outcome, vec![Some(JobStatus::Pending)]);
}

#[tokio::test]
async fn aggregation_skips_a_missing_parent() {
    let (_, cache) = cache();

    cache
        .check_set_parent_job("gone", JobStatus::Complete, None)
        .await
        .unwrap();
    assert!(cache.check_job("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn parent_with_no_children_is_updated_directly() {
    let (_, cache) = cache();
    let parent = cache.create_job(None).await.unwrap();

    cache
        .check_set_parent_job(&parent, JobStatus::Complete, Some(json!({ "n": 0 })))
        .await
        .unwrap();

    let record = cache.check_job(&parent).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Complete);
    assert_eq!(record.data, Some(json!({ "n": 0 })));
}
