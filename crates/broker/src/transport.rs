use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use svckit_core::utils::random_uuid;
use svckit_core::{ResponseEnvelope, ServiceError, ServiceResult};

/// Outbound side of the broker: deliver one payload to a destination
/// service, tagged with the sending service and a correlation id.
///
/// The payload is wrapped into the wire envelope (`{data, meta}`) by the
/// implementation; callers hand over the bare `data`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        data: &Value,
        destination: &str,
        source: &str,
        corr_id: &str,
    ) -> ServiceResult<()>;
}

/// Fire-and-forget publish with a best-effort fallback.
///
/// An empty or missing correlation id is replaced with a fresh uuid. When the
/// publish fails, one more attempt is made carrying a generic 500 envelope so
/// the caller at least learns the service is unwell; after that the failure
/// is only logged. Returns whether the original payload went out.
pub async fn trigger(
    transport: &dyn Transport,
    data: &Value,
    destination: &str,
    source: &str,
    corr_id: Option<&str>,
) -> bool {
    let generated;
    let corr_id = match corr_id {
        Some(c) if !c.is_empty() => c,
        _ => {
            generated = random_uuid();
            &generated
        }
    };

    if let Err(e) = transport.publish(data, destination, source, corr_id).await {
        error!(
            destination = %destination,
            corr_id = %corr_id,
            "failed to publish message: {e}"
        );
        let fallback = ResponseEnvelope::text(500, "Service issue").to_value();
        if let Err(e) = transport
            .publish(&fallback, destination, source, corr_id)
            .await
        {
            error!(destination = %destination, "fallback publish failed: {e}");
        }
        return false;
    }
    true
}

/// One message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub data: Value,
    pub destination: String,
    pub source: String,
    pub corr_id: String,
}

/// In-memory transport that records every publish. Used by the test suites
/// and by embedded deployments that have no broker.
#[derive(Default)]
pub struct MemoryTransport {
    messages: Mutex<Vec<PublishedMessage>>,
    failures_left: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().expect("transport lock poisoned").clone()
    }

    /// Make the next `n` publishes fail with a queue error.
    pub fn fail_next_publishes(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(
        &self,
        data: &Value,
        destination: &str,
        source: &str,
        corr_id: &str,
    ) -> ServiceResult<()> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(ServiceError::queue_error("simulated publish failure"));
        }

        self.messages
            .lock()
            .expect("transport lock poisoned")
            .push(PublishedMessage {
                data: data.clone(),
                destination: destination.to_string(),
                source: source.to_string(),
                corr_id: corr_id.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn trigger_publishes_and_reports_success() {
        let transport = MemoryTransport::new();
        let sent = trigger(&transport, &json!({"v": 1}), "dest", "src", Some("cid")).await;
        assert!(sent);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].data, json!({"v": 1}));
        assert_eq!(published[0].destination, "dest");
        assert_eq!(published[0].source, "src");
        assert_eq!(published[0].corr_id, "cid");
    }

    #[tokio::test]
    async fn trigger_generates_a_correlation_id_when_missing() {
        let transport = MemoryTransport::new();
        assert!(trigger(&transport, &json!({}), "dest", "src", None).await);
        let published = transport.published();
        assert_eq!(published[0].corr_id.len(), 32);
    }

    #[tokio::test]
    async fn trigger_falls_back_to_a_generic_500_on_failure() {
        let transport = MemoryTransport::new();
        transport.fail_next_publishes(1);

        let sent = trigger(&transport, &json!({"v": 1}), "dest", "src", Some("cid")).await;
        assert!(!sent);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].data,
            json!({"code": 500, "response": {"message": "Service issue"}})
        );
    }

    #[tokio::test]
    async fn trigger_survives_a_failing_fallback() {
        let transport = MemoryTransport::new();
        transport.fail_next_publishes(2);

        let sent = trigger(&transport, &json!({"v": 1}), "dest", "src", Some("cid")).await;
        assert!(!sent);
        assert!(transport.published().is_empty());
    }
}
