use serde_json::Value;
use thiserror::Error;

/// Error taxonomy shared across the fleet.
///
/// `Service` is the declared business error: handlers raise it to signal a
/// recoverable, caller-facing failure, and the subscriber boundary translates
/// it into a reply or a job-cache update. Every other variant is treated as
/// unexpected by the message-processing pipeline.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Service {
        code: u16,
        message: String,
        errors: Option<Value>,
    },
    #[error("message queue error: {0}")]
    MessageQueue(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn service<S: Into<String>>(code: u16, message: S, errors: Option<Value>) -> Self {
        Self::Service {
            code,
            message: message.into(),
            errors,
        }
    }

    /// The default business error, code 400.
    pub fn request_error() -> Self {
        Self::service(400, "Request error.", None)
    }

    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }

    pub fn cache_error<S: Into<String>>(msg: S) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn handler_error<S: Into<String>>(msg: S) -> Self {
        Self::Handler(msg.into())
    }

    /// True for declared business errors, false for everything the
    /// subscriber must treat as unexpected.
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Service { .. })
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
