/// CLI argument parsing and command handling - Gateway
mod args;
mod commands;

pub use args::{Action, Cli};
pub use commands::{handle_action, run_command, run_gc, show_config, show_stats};
