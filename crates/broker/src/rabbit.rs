use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use svckit_core::{BrokerConfig, ServiceError, ServiceResult, WireMessage};

/// RabbitMQ transport.
///
/// Fleet topology is one durable direct exchange per service: publishing to a
/// service means publishing to the exchange bearing its name, and the wire
/// envelope carries the sender and correlation id in `meta`.
pub struct RabbitTransport {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    config: BrokerConfig,
}

impl RabbitTransport {
    pub async fn connect(config: BrokerConfig) -> ServiceResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to connect to broker: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to create channel: {e}")))?;

        info!("connected to message broker at {}", config.url);

        Ok(Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            config,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> ServiceResult<()> {
        self.connection
            .close(200, "shutting down")
            .await
            .map_err(|e| ServiceError::queue_error(format!("failed to close connection: {e}")))?;
        info!("broker connection closed");
        Ok(())
    }
}

pub(crate) async fn declare_service_exchange(
    channel: &Channel,
    name: &str,
    kind: ExchangeKind,
) -> ServiceResult<()> {
    channel
        .exchange_declare(
            name,
            kind,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| ServiceError::queue_error(format!("failed to declare exchange {name}: {e}")))?;
    debug!("exchange {} declared", name);
    Ok(())
}

#[async_trait]
impl super::transport::Transport for RabbitTransport {
    async fn publish(
        &self,
        data: &Value,
        destination: &str,
        source: &str,
        corr_id: &str,
    ) -> ServiceResult<()> {
        let message = WireMessage::new(data.clone(), source, corr_id);
        let payload = serde_json::to_vec(&message)
            .map_err(|e| ServiceError::Serialization(format!("failed to encode message: {e}")))?;

        let channel = self.channel.lock().await;
        declare_service_exchange(&channel, destination, ExchangeKind::Direct).await?;

        let confirm = channel
            .basic_publish(
                destination,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // persistent
                    .with_correlation_id(corr_id.to_string().into()),
            )
            .await
            .map_err(|e| {
                ServiceError::queue_error(format!("failed to publish to {destination}: {e}"))
            })?;

        confirm
            .await
            .map_err(|e| ServiceError::queue_error(format!("publish not confirmed: {e}")))?;

        debug!(destination = %destination, corr_id = %corr_id, "message published");
        Ok(())
    }
}
