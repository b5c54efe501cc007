//! Framewise job record storage
//!
//! Two layers live here:
//!
//! - [`store`]: a key/value-of-hashes accessor ([`RecordStore`]) with an
//!   in-memory implementation and, behind the `redis` feature, a Redis one.
//! - [`lifecycle`]: the [`JobLifecycle`] manager, which is the only writer of
//!   job records and enforces the status transition table atomically.

pub mod codec;
pub mod lifecycle;
pub mod store;

pub use lifecycle::{JobLifecycle, LifecycleConfig, LifecycleError};
pub use store::memory::MemoryStore;
#[cfg(feature = "redis")]
pub use store::redis::RedisStore;
pub use store::{CasOutcome, Fields, RecordStore, StoreError, StoreResult};
