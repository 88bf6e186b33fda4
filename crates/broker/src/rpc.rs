use std::time::Duration;

use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Connection, ConnectionProperties, ExchangeKind,
};
use serde_json::Value;
use tracing::{debug, warn};

use svckit_core::utils::{random_string, random_uuid};
use svckit_core::{BrokerConfig, ServiceError, ServiceResult, WireMessage};

use crate::rabbit::declare_service_exchange;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// RPC-style call over the broker: publish a request to a destination
/// service and wait for the correlation-matched reply on a temporary queue
/// bound to the caller's exchange.
///
/// A connection is opened per call; RPC traffic in the fleet is low-volume
/// and the temporary reply queue dies with it.
pub struct RpcClient {
    config: BrokerConfig,
    exchange: String,
    timeout: Duration,
}

impl RpcClient {
    /// `exchange` is the calling service's own exchange, where replies are
    /// addressed.
    pub fn new(config: BrokerConfig, exchange: impl Into<String>) -> Self {
        Self {
            config,
            exchange: exchange.into(),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `data` to `destination` and return the reply's `data`.
    pub async fn call(
        &self,
        data: &Value,
        destination: &str,
        corr_id: Option<&str>,
    ) -> ServiceResult<Value> {
        let generated;
        let corr_id = match corr_id {
            Some(c) if !c.is_empty() => c,
            _ => {
                generated = random_uuid();
                &generated
            }
        };

        let connection = Connection::connect(&self.config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to connect to broker: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to create channel: {e}")))?;

        // Temporary reply queue, bound to our own exchange where the callee
        // will address its response.
        declare_service_exchange(&channel, &self.exchange, ExchangeKind::Direct).await?;
        let reply_queue = format!("temp_{}", random_string(6));
        channel
            .queue_declare(
                &reply_queue,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to declare reply queue: {e}")))?;
        channel
            .queue_bind(
                &reply_queue,
                &self.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to bind reply queue: {e}")))?;

        let mut consumer = channel
            .basic_consume(
                &reply_queue,
                &format!("rpc_{corr_id}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to consume replies: {e}")))?;

        declare_service_exchange(&channel, destination, ExchangeKind::Direct).await?;
        let request = WireMessage::new(data.clone(), &self.exchange, corr_id);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ServiceError::Serialization(format!("failed to encode request: {e}")))?;
        channel
            .basic_publish(
                destination,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_correlation_id(corr_id.to_string().into()),
            )
            .await
            .map_err(|e| {
                ServiceError::queue_error(format!("failed to publish to {destination}: {e}"))
            })?
            .await
            .map_err(|e| ServiceError::queue_error(format!("publish not confirmed: {e}")))?;
        debug!(destination = %destination, corr_id = %corr_id, "rpc request sent");

        let reply = tokio::time::timeout(self.timeout, async {
            while let Some(delivery) = consumer.next().await {
                let delivery = delivery
                    .map_err(|e| ServiceError::queue_error(format!("reply consumer error: {e}")))?;
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(|e| ServiceError::queue_error(format!("failed to ack reply: {e}")))?;

                let message: WireMessage = match serde_json::from_slice(&delivery.data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("discarding unparseable reply: {e}");
                        continue;
                    }
                };
                if message.meta.correlation_id == corr_id {
                    return Ok(message.data);
                }
                debug!(
                    corr_id = %message.meta.correlation_id,
                    "ignoring reply for another call"
                );
            }
            Err(ServiceError::queue_error(
                "reply consumer closed before a response arrived",
            ))
        })
        .await
        .map_err(|_| {
            ServiceError::Timeout(format!(
                "no reply from {destination} within {}s",
                self.timeout.as_secs()
            ))
        })??;

        let _ = connection.close(200, "rpc call finished").await;
        Ok(reply)
    }
}
