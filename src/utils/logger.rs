use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::Config;
use crate::constants::LOG_FILTER_ENV;

/// Initialize the logging system
///
/// Logs only go to the configured log file: the wrapped command owns stderr.
/// Returns `false` when logging stays disabled, either because no log file is
/// configured or because it could not be opened.
pub fn init_logger(config: &Config) -> bool {
    let Some(log_file) = config.log_file.as_ref() else {
        return false;
    };

    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() && fs::create_dir_all(parent).is_err() {
            return false;
        }
    }

    let file = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => file,
        Err(_) => return false,
    };

    // BINCACHE_LOG overrides the configured level
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .is_ok()
}
