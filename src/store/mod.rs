//! Durable mirror of in-flight alarm state.
//!
//! The pipeline persists through the [`Mirror`] trait, a small subset of a
//! key/value store with ordered sets, lists and expiring flags. Every call is
//! a single store operation; the pipeline never assumes that two calls are
//! applied atomically.
//!
//! [`MemoryMirror`] is a complete in-process backend. [`AlarmStore`] builds
//! the alarm record layout (record + per-priority index) on top of any
//! mirror.

pub mod memory;
pub mod record;

pub use memory::MemoryMirror;
pub use record::{AlarmStore, Dto};

use crate::error::StoreResult;
use std::time::Duration;

/// Operations required from the durable store.
pub trait Mirror: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Unix timestamp (seconds) of the last write to `key`.
    fn last_write(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Estimated number of plain keys.
    fn key_count(&self) -> StoreResult<usize>;

    /// A uniformly sampled plain key, `None` when the keyspace is empty.
    fn random_key(&self) -> StoreResult<Option<String>>;

    fn zadd(&self, set: &str, member: &str, score: i64) -> StoreResult<()>;

    fn zrem(&self, set: &str, member: &str) -> StoreResult<()>;

    /// Every member of `set` with its score, ascending by score.
    fn zrange_with_scores(&self, set: &str) -> StoreResult<Vec<(String, i64)>>;

    /// Appends to the tail of `list`.
    fn rpush(&self, list: &str, value: &str) -> StoreResult<()>;

    /// Removes and returns the head of `list`.
    fn lpop(&self, list: &str) -> StoreResult<Option<String>>;

    fn llen(&self, list: &str) -> StoreResult<usize>;

    /// Sets a flag that expires after `ttl`.
    fn flag_set(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    fn flag_get(&self, key: &str) -> StoreResult<bool>;

    fn flag_del(&self, key: &str) -> StoreResult<()>;
}
