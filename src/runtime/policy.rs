use super::executor::CapturedOutput;
use crate::app::Config;

/// Decides which finished runs are worth caching
///
/// Only successful runs are cached. By default a run that wrote anything to
/// stderr is treated as suspect and not cached either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub cache_nonempty_stderr: bool,
}

impl CachePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_nonempty_stderr: config.cache_nonempty_stderr,
        }
    }

    pub fn is_cacheable(&self, output: &CapturedOutput) -> bool {
        output.success() && (self.cache_nonempty_stderr || output.stderr.is_empty())
    }
}
