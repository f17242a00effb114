//! Cache engine: content-addressed, size-bounded, on-disk storage
//!
//! - `storage`: atomic read/write/remove primitives
//! - `store`: sharded fingerprint → value mapping
//! - `lock`: per-shard advisory locks
//! - `eviction`: LRU sweep keeping the store under its size budget
//! - `gc`: cleanup of stale entries, orphaned temporary files and empty shards
//! - `stats`: optional hit/miss accounting

mod eviction;
mod gc;
mod lock;
mod stats;
mod storage;
mod store;
mod types;

pub use eviction::{enforce, scan_entries, EntryInfo, EvictionReport};
pub use gc::{collect_garbage, collect_garbage_older_than, sweep_stale_entries, GcReport};
pub use lock::{LockMode, ShardLock};
pub use stats::{CacheStats, StatsCounters, StatsEvent};
pub use storage::{read_file, remove_file, write_file};
pub use store::CacheStore;
pub use types::{EntryOrigin, Fingerprint};
