//! Core types for broker-based microservice plumbing: error taxonomy, wire
//! models, the handler registry and dispatch protocol, pagination helpers,
//! configuration and logging setup.

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod utils;

pub use config::{BrokerConfig, CacheConfig};
pub use error::{ServiceError, ServiceResult};
pub use handler::{DispatchOutcome, Handler, HandlerRegistry};
pub use logging::init_logging;
pub use models::job::{JobRecord, JobStatus};
pub use models::message::{MessageMeta, WireMessage};
pub use models::response::ResponseEnvelope;
pub use pagination::{paginate, Page, PageParams, SortDirection};
