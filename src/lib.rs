//! svckit: shared plumbing for a fleet of microservices that talk to each
//! other over a RabbitMQ RPC/pub-sub layer.
//!
//! The crate is an umbrella over two workspace members:
//!
//! - [`svckit_core`] carries the pure types and logic: the error taxonomy,
//!   message/job/response models, the handler registry with its dispatch
//!   protocol, pagination helpers and configuration.
//! - [`svckit_broker`] carries the external collaborators: the lapin-backed
//!   transport, the subscriber message-processing pipeline with its `listen`
//!   entrypoint, the RPC client, and the Redis-backed job cache.

pub use svckit_core::{
    init_logging, paginate, BrokerConfig, CacheConfig, DispatchOutcome, Handler, HandlerRegistry,
    JobRecord, JobStatus, MessageMeta, Page, PageParams, ResponseEnvelope, ServiceError,
    ServiceResult, SortDirection, WireMessage,
};

pub use svckit_broker::{
    listen, register_service_pid, run_service, trigger, CacheStore, JobCache, ListenConfig,
    MemoryStore, MemoryTransport, RabbitTransport, RedisStore, RpcClient, ScopedCache, Subscriber,
    Transport,
};
