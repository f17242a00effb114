/// Constants module to avoid magic numbers in the codebase

// Cache Layout
pub const APP_NAME: &str = "bincache";
pub const CONFIG_FILE: &str = "bincache.toml";
pub const STATS_FILE: &str = "stats.json";
pub const DEFAULT_TEMPORARY_DIR: &str = "tmp";
pub const SHARD_LOCK_FILE: &str = ".lock";
pub const SHARD_PREFIX_LEN: usize = 2;

// Size Limits
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024 * 1024; // 5G

// Hashing
pub const HASH_CHUNK_SIZE: usize = 8192;

// Garbage Collection
pub const ORPHAN_TEMP_MAX_AGE_SECS: u64 = 60 * 60;

// Environment
pub const CACHE_DIR_ENV: &str = "BINCACHE_DIR";
pub const ENV_PREFIX: &str = "BINCACHE_";
pub const LOG_FILTER_ENV: &str = "BINCACHE_LOG";

// Exit Codes (shell conventions)
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
pub const EXIT_PERMISSION_DENIED: i32 = 126;
pub const EXIT_GENERIC_FAILURE: i32 = 1;
pub const EXIT_SIGNAL_BASE: i32 = 128;
