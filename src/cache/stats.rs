use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::eviction::scan_entries;
use super::storage::{read_file, write_file};
use crate::app::Config;
use crate::constants::STATS_FILE;
use crate::utils::{IoResultExt, Result};

/// Hit/miss counters persisted in the cache root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCounters {
    pub hits: u64,
    pub misses: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    Hit,
    Miss,
}

impl StatsCounters {
    fn path(root: &Path) -> PathBuf {
        root.join(STATS_FILE)
    }

    /// Read the counters; a missing file means all zeros
    pub fn load(root: &Path) -> Result<Self> {
        match read_file(&Self::path(root))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Self::default()),
        }
    }

    /// Count one lookup.
    ///
    /// Read-modify-write without a lock: concurrent invocations may lose an
    /// increment, never corrupt the file.
    pub fn record(root: &Path, temporary_dir: Option<&Path>, event: StatsEvent) -> Result<()> {
        let mut counters = Self::load(root).unwrap_or_else(|e| {
            warn!("Resetting unreadable stats file: {}", e);
            Self::default()
        });

        match event {
            StatsEvent::Hit => counters.hits += 1,
            StatsEvent::Miss => counters.misses += 1,
        }
        counters.updated_at = Some(Utc::now());

        std::fs::create_dir_all(root).with_path(root)?;
        let json = serde_json::to_vec_pretty(&counters)?;
        write_file(&Self::path(root), &json, temporary_dir)
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub updated_at: Option<DateTime<Utc>>,
    pub cache_directory: PathBuf,
}

impl CacheStats {
    /// Gather statistics for the cache described by `config`
    pub fn collect(config: &Config) -> Result<Self> {
        let entries = scan_entries(&config.cache_dir)?;
        let counters = StatsCounters::load(&config.cache_dir).unwrap_or_default();
        let lookups = counters.hits + counters.misses;
        let hit_rate = if lookups > 0 {
            (counters.hits as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        Ok(Self {
            entries: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
            max_size: config.max_size,
            hits: counters.hits,
            misses: counters.misses,
            hit_rate,
            updated_at: counters.updated_at,
            cache_directory: config.cache_dir.clone(),
        })
    }

    /// Format cache stats for display
    pub fn format(&self) -> String {
        let updated = self
            .updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Cache Statistics:\n\
            Directory: {}\n\
            Entries: {}\n\
            Total Size: {:.2} MB of {:.2} MB\n\
            Hit Rate: {:.1}% ({} hits, {} misses)\n\
            Last Updated: {}",
            self.cache_directory.display(),
            self.entries,
            self.total_size as f64 / 1_048_576.0,
            self.max_size as f64 / 1_048_576.0,
            self.hit_rate,
            self.hits,
            self.misses,
            updated
        )
    }
}
