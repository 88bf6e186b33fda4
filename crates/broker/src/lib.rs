//! Broker-facing plumbing: the lapin transport, the subscriber
//! message-processing pipeline, the RPC client and the cache-backed job
//! tracker.

pub mod cache;
pub mod rabbit;
pub mod rpc;
pub mod runtime;
pub mod subscriber;
pub mod transport;

pub use cache::{
    CacheStore, JobCache, MemoryStore, RedisStore, ScopedCache, JOB_NAMESPACE, JOB_TTL_SECONDS,
};
pub use rabbit::RabbitTransport;
pub use rpc::RpcClient;
pub use runtime::{register_service_pid, run_service};
pub use subscriber::{listen, ListenConfig, Subscriber};
pub use transport::{trigger, MemoryTransport, PublishedMessage, Transport};
