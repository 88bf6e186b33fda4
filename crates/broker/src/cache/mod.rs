//! Key-value cache layer: a store trait with Redis and in-memory
//! implementations, a prefix/TTL-scoped wrapper, and the job tracker built
//! on top of it.

mod job_cache;
mod memory;
mod redis_store;
mod scoped;
mod store;

pub use job_cache::{JobCache, JOB_NAMESPACE, JOB_TTL_SECONDS};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use scoped::ScopedCache;
pub use store::CacheStore;
