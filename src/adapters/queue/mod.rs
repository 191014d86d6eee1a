//! Job store adapters.
//!
//! - `RedisJobStore` - list store (`BLPOP` claim, Lua terminal write)
//! - `PostgresJobStore` - document store (`SKIP LOCKED` claim, conditional update)
//! - `InMemoryJobStore` - single process, for tests and local runs

mod in_memory_store;
mod keys;
mod log_entry;
mod postgres_store;
mod redis_store;

pub use in_memory_store::{InMemoryJobStore, DEFAULT_CANCEL_TTL};
pub use keys::{QueueKeys, DEFAULT_KEY_PREFIX};
pub use log_entry::{TerminalLogEntry, DEFAULT_LOG_CAP};
pub use postgres_store::{PostgresJobStore, DEFAULT_POLL_INTERVAL};
pub use redis_store::RedisJobStore;
