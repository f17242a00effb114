use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::constants::CACHE_DIR_ENV;

#[derive(Parser, Debug)]
#[command(name = "bincache")]
#[command(version)]
#[command(about = "Memoize the output of deterministic commands", long_about = None)]
#[command(arg_required_else_help = true)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["gc", "stats", "show_config", "command"])
))]
pub struct Cli {
    /// Cache directory (defaults to the user cache directory)
    #[arg(long, value_name = "DIR", env = CACHE_DIR_ENV)]
    pub cache_dir: Option<PathBuf>,

    /// Remove stale temporary files and empty shard directories
    #[arg(long)]
    pub gc: bool,

    /// Show cache statistics
    #[arg(long)]
    pub stats: bool,

    /// Print the effective configuration
    #[arg(long)]
    pub show_config: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// What a parsed command line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Gc,
    Stats,
    ShowConfig,
    Run { program: String, args: Vec<String> },
}

impl Cli {
    pub fn action(&self) -> Action {
        if self.gc {
            Action::Gc
        } else if self.stats {
            Action::Stats
        } else if self.show_config {
            Action::ShowConfig
        } else {
            let mut words = self.command.iter().cloned();
            let program = words.next().unwrap_or_default();
            Action::Run {
                program,
                args: words.collect(),
            }
        }
    }
}
