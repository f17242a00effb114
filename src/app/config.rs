use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{
    APP_NAME, CONFIG_FILE, DEFAULT_MAX_SIZE, DEFAULT_TEMPORARY_DIR, ENV_PREFIX,
};

/// Main configuration structure
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cache root directory. Never read from the config file, since the
    /// config file lives inside it.
    #[serde(skip)]
    pub cache_dir: PathBuf,

    /// Maximum total size of all entries, in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub max_size: u64,

    /// Directory for in-flight writes; should share a filesystem with `cache_dir`
    pub temporary_dir: PathBuf,

    /// Log file; logging is disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Minimum level written to the log file
    pub log_level: LogLevel,

    /// Record hit/miss counters in the cache root
    pub stats: bool,

    /// Cache successful runs even when they wrote to stderr
    pub cache_nonempty_stderr: bool,
}

impl Config {
    /// Default configuration rooted at `cache_dir`
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        Self {
            temporary_dir: cache_dir.join(DEFAULT_TEMPORARY_DIR),
            cache_dir,
            max_size: DEFAULT_MAX_SIZE,
            log_file: None,
            log_level: LogLevel::default(),
            stats: false,
            cache_nonempty_stderr: false,
        }
    }

    /// Path of the config file read for this cache root
    pub fn config_file(&self) -> PathBuf {
        self.cache_dir.join(CONFIG_FILE)
    }

    /// Anchor relative paths to the cache root.
    ///
    /// A log file written as `./name` stays relative to the working directory.
    fn resolve_paths(&mut self) {
        self.log_file = self.log_file.take().and_then(|log_file| {
            if log_file.as_os_str().is_empty() {
                None
            } else if log_file.is_absolute() || log_file.starts_with(".") {
                Some(log_file)
            } else {
                Some(self.cache_dir.join(log_file))
            }
        });

        if self.temporary_dir.as_os_str().is_empty() {
            self.temporary_dir = self.cache_dir.join(DEFAULT_TEMPORARY_DIR);
        } else if self.temporary_dir.is_relative() {
            self.temporary_dir = self.cache_dir.join(&self.temporary_dir);
        }
    }
}

/// Log levels accepted in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {:?}", other)),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Parse a size such as `"512"`, `"10K"`, `"2m"` or `"5G"` into bytes
pub fn parse_size(input: &str) -> std::result::Result<u64, String> {
    let text = input.trim().to_ascii_uppercase();
    let (digits, multiplier) = match text.chars().last() {
        Some('B') => (&text[..text.len() - 1], 1u64),
        Some('K') => (&text[..text.len() - 1], 1024),
        Some('M') => (&text[..text.len() - 1], 1024 * 1024),
        Some('G') => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text.as_str(), 1),
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {:?}", input))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size out of range: {:?}", input))
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Bytes(u64),
        Text(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(bytes) => Ok(bytes),
        SizeValue::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

/// Load configuration for a cache root from multiple sources
///
/// Defaults, then `<cache_dir>/bincache.toml`, then `BINCACHE_*` variables.
pub fn load_config(cache_dir: &Path) -> Result<Config> {
    let config_file = cache_dir.join(CONFIG_FILE);

    // Build figment configuration
    let mut figment = Figment::from(Serialized::defaults(Config::with_cache_dir(cache_dir)));

    if config_file.exists() {
        figment = figment.merge(Toml::file(&config_file));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX));

    let mut config: Config = figment
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", config_file.display()))?;

    config.cache_dir = cache_dir.to_path_buf();
    config.resolve_paths();
    Ok(config)
}

/// Per-user cache root (`~/.cache/bincache` on Linux)
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
        Ok(proj_dirs.cache_dir().to_path_buf())
    } else {
        // Fallback to ~/.cache/bincache
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".cache").join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10B").unwrap(), 10);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("5g").unwrap(), 5 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("1000").unwrap(), 1000);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("ten").is_err());
        assert!(parse_size("99999999999999G").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::with_cache_dir("/var/cache/bincache");
        assert_eq!(config.max_size, 5 * 1024 * 1024 * 1024);
        assert_eq!(config.temporary_dir, PathBuf::from("/var/cache/bincache/tmp"));
        assert_eq!(config.log_file, None);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.stats);
        assert!(!config.cache_nonempty_stderr);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.cache_dir, temp.path());
        assert_eq!(config.temporary_dir, temp.path().join("tmp"));
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_load_with_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            r#"
max_size = "10M"
log_file = "test.log"
log_level = "debug"
stats = true
temporary_dir = "/tmp/test_tmp"
"#,
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.max_size, 10 * 1024 * 1024);
        assert_eq!(config.log_file, Some(temp.path().join("test.log")));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.stats);
        assert_eq!(config.temporary_dir, PathBuf::from("/tmp/test_tmp"));
    }

    #[test]
    fn test_integer_max_size() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "max_size = 4096\n").unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.max_size, 4096);
    }

    #[test]
    fn test_relative_log_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "log_file = \"relative/test.log\"\n",
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(
            config.log_file,
            Some(temp.path().join("relative").join("test.log"))
        );
    }

    #[test]
    fn test_dot_relative_log_file_kept() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "log_file = \"./here.log\"\n").unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("./here.log")));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "max_size = \"lots\"\nlog_level = \"LOUD\"\n",
        )
        .unwrap();

        assert!(load_config(temp.path()).is_err());
    }

    #[test]
    fn test_log_level_roundtrip_names() {
        for name in ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"] {
            let level: LogLevel = name.parse().unwrap();
            assert_eq!(level.to_string(), name);
        }
        assert_eq!(LogLevel::Critical.as_filter(), "error");
        assert_eq!(LogLevel::Warning.as_filter(), "warn");
    }

    #[test]
    fn test_log_level_try_from_string() {
        assert_eq!(LogLevel::try_from("error".to_string()), Ok(LogLevel::Error));
        assert_eq!(LogLevel::try_from(" Warn ".to_string()), Ok(LogLevel::Warning));
        assert!(LogLevel::try_from("loud".to_string()).is_err());
    }
}
