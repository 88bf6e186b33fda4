use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicQosOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Connection, ConnectionProperties, ExchangeKind,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use svckit_core::{
    BrokerConfig, DispatchOutcome, HandlerRegistry, JobStatus, ResponseEnvelope, ServiceError,
    ServiceResult,
};

use crate::cache::JobCache;
use crate::rabbit::declare_service_exchange;
use crate::transport::{trigger, Transport};

pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Processes one inbound message end to end: resolve the handler through the
/// registry, run it, and translate the result into a reply or a job-cache
/// update.
///
/// Four outcomes per message:
/// 1. no `data.method`: not a dispatch request, nothing is sent;
/// 2. the dispatch result (including the 404 routing-miss envelope) is
///    published back to `meta.source` under the original correlation id;
/// 3. a declared business error either marks the job FAILED in the cache
///    (when the request carries a `job_key` and a cache is wired) or goes
///    back as an error envelope;
/// 4. anything else is logged and answered with a generic 500 (or a generic
///    job failure); the error never escapes to the consume loop.
///
/// The completion callback, when set, runs after every message on every path.
pub struct Subscriber {
    exchange: String,
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    job_cache: Option<Arc<JobCache>>,
    handler_timeout: Option<Duration>,
    on_complete: Option<CompletionCallback>,
}

impl Subscriber {
    pub fn new(
        exchange: impl Into<String>,
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            registry,
            transport,
            job_cache: None,
            handler_timeout: None,
            on_complete: None,
        }
    }

    /// Enable job-cache integration: business errors on requests carrying a
    /// `job_key` update the job record instead of replying.
    pub fn with_job_cache(mut self, job_cache: Arc<JobCache>) -> Self {
        self.job_cache = Some(job_cache);
        self
    }

    /// Cap handler execution. Without a cap a hung handler blocks its worker
    /// indefinitely, which matches the historical behavior of the fleet; an
    /// elapsed cap takes the unexpected-error path.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Invoked after every message, success or failure. Panics in the
    /// callback are caught and logged.
    pub fn on_message_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// Handle one inbound message body. Returns whether the message was
    /// dispatched and answered (or recorded) cleanly.
    pub async fn handle(&self, body: &Value) -> bool {
        let handled = self.process(body).await;
        if let Some(callback) = &self.on_complete {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("message completion callback panicked");
            }
        }
        handled
    }

    async fn process(&self, body: &Value) -> bool {
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let Some(method) = data.get("method").and_then(Value::as_str).map(String::from) else {
            debug!("message carries no method, nothing to dispatch");
            return false;
        };

        let meta = body.get("meta");
        let corr_id = meta
            .and_then(|m| m.get("correlationId"))
            .and_then(Value::as_str)
            .unwrap_or("none")
            .to_string();
        let destination = meta
            .and_then(|m| m.get("source"))
            .and_then(Value::as_str)
            .map(String::from);
        let job_key = data
            .get("job_key")
            .and_then(Value::as_str)
            .or_else(|| {
                data.get("request")
                    .and_then(|r| r.get("job_key"))
                    .and_then(Value::as_str)
            })
            .map(String::from);

        match self.dispatch(&data, &corr_id).await {
            Ok(outcome) => {
                let reply = outcome.into_reply();
                match destination {
                    Some(destination) => {
                        trigger(
                            self.transport.as_ref(),
                            &reply,
                            &destination,
                            &self.exchange,
                            Some(&corr_id),
                        )
                        .await;
                    }
                    None => warn!(
                        corr_id = %corr_id,
                        method = %method,
                        "reply destination unknown, dropping response"
                    ),
                }
                true
            }
            Err(ServiceError::Service {
                code,
                message,
                errors,
            }) => {
                debug!(
                    corr_id = %corr_id,
                    method = %method,
                    code,
                    "handler raised a service error: {message}"
                );
                match (&job_key, &self.job_cache) {
                    (Some(job_key), Some(job_cache)) => {
                        let detail = json!({ "message": message, "errors": errors });
                        if let Err(e) = job_cache
                            .set_progress(job_key, JobStatus::Failed, Some(detail))
                            .await
                        {
                            error!(job_key = %job_key, "failed to record job failure: {e}");
                        }
                    }
                    _ => {
                        let envelope = ResponseEnvelope::build(
                            code,
                            Some(Value::String(message)),
                            errors,
                            false,
                        );
                        match destination {
                            Some(destination) => {
                                trigger(
                                    self.transport.as_ref(),
                                    &envelope.to_value(),
                                    &destination,
                                    &self.exchange,
                                    Some(&corr_id),
                                )
                                .await;
                            }
                            None => warn!(
                                corr_id = %corr_id,
                                method = %method,
                                "no destination for service error reply"
                            ),
                        }
                    }
                }
                true
            }
            Err(err) => {
                error!(
                    corr_id = %corr_id,
                    method = %method,
                    service = %self.exchange,
                    "unexpected error while processing message: {err}"
                );
                if let Some(destination) = destination {
                    match (&job_key, &self.job_cache) {
                        (Some(job_key), Some(job_cache)) => {
                            let detail =
                                json!({ "message": format!("Service issue with job {job_key}") });
                            if let Err(e) = job_cache
                                .set_progress(job_key, JobStatus::Failed, Some(detail))
                                .await
                            {
                                error!(job_key = %job_key, "failed to record job failure: {e}");
                            }
                        }
                        _ => {
                            let message = format!(
                                "Service issue with corr id {corr_id}, method {method} and service {}, called by {destination}",
                                self.exchange
                            );
                            trigger(
                                self.transport.as_ref(),
                                &ResponseEnvelope::text(500, &message).to_value(),
                                &destination,
                                &self.exchange,
                                Some(&corr_id),
                            )
                            .await;
                        }
                    }
                }
                false
            }
        }
    }

    async fn dispatch(&self, data: &Value, corr_id: &str) -> ServiceResult<DispatchOutcome> {
        match self.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, self.registry.dispatch(data, corr_id))
                .await
                .map_err(|_| {
                    ServiceError::Timeout(format!("handler exceeded {}ms", limit.as_millis()))
                })?,
            None => self.registry.dispatch(data, corr_id).await,
        }
    }
}

/// Settings for one consume loop.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub exchange: String,
    pub exchange_type: String,
    pub queue: String,
    /// Max messages processed concurrently; doubles as the prefetch count.
    pub max_workers: usize,
}

impl ListenConfig {
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            exchange_type: "direct".to_string(),
            queue: queue.into(),
            max_workers: 10,
        }
    }

    pub fn with_exchange_type(mut self, exchange_type: impl Into<String>) -> Self {
        self.exchange_type = exchange_type.into();
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

// basic_qos takes a u16; a larger worker pool just pins prefetch at the max.
fn prefetch_count(max_workers: usize) -> u16 {
    u16::try_from(max_workers).unwrap_or(u16::MAX)
}

fn exchange_kind(name: &str) -> ExchangeKind {
    match name {
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Direct,
    }
}

/// Consume the service queue and feed every delivery through the subscriber.
///
/// Each message runs on its own task behind a semaphore permit, so at most
/// `max_workers` messages are in flight; the broker is told the same number
/// as its prefetch count and cannot hand work to a saturated worker pool.
/// Messages are acked after `handle` returns (at-least-once delivery); a
/// body that is not JSON is logged and acked, and a panicking handler task
/// leaves its message unacked for redelivery.
pub async fn listen(
    broker: &BrokerConfig,
    config: ListenConfig,
    subscriber: Subscriber,
) -> ServiceResult<()> {
    let connection = Connection::connect(&broker.url, ConnectionProperties::default())
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to connect to broker: {e}")))?;
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to create channel: {e}")))?;

    declare_service_exchange(&channel, &config.exchange, exchange_kind(&config.exchange_type))
        .await?;
    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            ServiceError::queue_error(format!("failed to declare queue {}: {e}", config.queue))
        })?;
    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to bind queue: {e}")))?;
    channel
        .basic_qos(prefetch_count(config.max_workers), BasicQosOptions::default())
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to set prefetch: {e}")))?;

    let mut consumer = channel
        .basic_consume(
            &config.queue,
            &format!("{}_consumer", config.exchange),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to start consumer: {e}")))?;

    info!(
        exchange = %config.exchange,
        queue = %config.queue,
        max_workers = config.max_workers,
        "listening for messages"
    );

    let subscriber = Arc::new(subscriber);
    let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("consumer error: {e}");
                continue;
            }
        };

        let permit = match Arc::clone(&workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let subscriber = Arc::clone(&subscriber);

        tokio::spawn(async move {
            let _permit = permit;
            match serde_json::from_slice::<Value>(&delivery.data) {
                Ok(body) => {
                    subscriber.handle(&body).await;
                }
                Err(e) => warn!("discarding message with invalid JSON body: {e}"),
            }
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!("failed to ack message: {e}");
            }
        });
    }

    info!(exchange = %config.exchange, "consumer stream closed");
    Ok(())
}
