use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, Write};
use tracing::{error, info};

use crate::app::Config;
use crate::cache::{collect_garbage, sweep_stale_entries, CacheStats};
use crate::constants::EXIT_GENERIC_FAILURE;
use crate::runtime::{Orchestrator, OutputSource};
use crate::signature::SignatureEngine;

use super::Action;

/// Dispatch a parsed action. Returns the process exit code.
pub fn handle_action(action: &Action, config: &Config) -> i32 {
    let result = match action {
        Action::Gc => run_gc(config),
        Action::Stats => show_stats(config),
        Action::ShowConfig => show_config(config),
        Action::Run { program, args } => return run_command(program, args, config),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "bincache:".red(), e);
            EXIT_GENERIC_FAILURE
        }
    }
}

/// Run `program args` through the cache and replay its output.
///
/// The exit code is the command's own, or the shell convention when it could
/// not be started.
pub fn run_command(program: &str, args: &[String], config: &Config) -> i32 {
    let orchestrator = Orchestrator::new(config);

    let outcome = match orchestrator.run(program, args) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            eprintln!("bincache: {}", e);
            return e.exit_code();
        }
    };

    if outcome.source == OutputSource::Cache {
        info!("Replaying cached output of {}", program);
    }

    if let Err(e) = replay(&outcome.output.stdout, &outcome.output.stderr) {
        error!("Failed to write output: {}", e);
    }
    outcome.output.exit_code
}

fn replay(stdout: &[u8], stderr: &[u8]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(stdout)?;
    out.flush()?;

    let mut err = io::stderr().lock();
    err.write_all(stderr)?;
    err.flush()
}

/// Remove stale entries, then temporary files and empty shards
pub fn run_gc(config: &Config) -> Result<()> {
    let engine = SignatureEngine::default();
    let stale = sweep_stale_entries(&config.cache_dir, |origin| {
        engine.signature(&origin.binary, &origin.args)
    })
    .context("Stale entry sweep failed")?;

    let mut report = collect_garbage(&config.cache_dir, &config.temporary_dir)
        .context("Garbage collection failed")?;
    report.removed_stale_entries = stale;

    println!(
        "{} Removed {} stale entries, {} temporary file(s) and {} empty shard(s)",
        "[OK]".green(),
        report.removed_stale_entries,
        report.removed_temp_files,
        report.removed_empty_shards
    );
    Ok(())
}

/// Print entry count, size and hit rate
pub fn show_stats(config: &Config) -> Result<()> {
    let stats = CacheStats::collect(config).context("Failed to read cache statistics")?;
    println!("{}", stats.format());
    if !config.stats {
        println!(
            "{}",
            "Hit/miss counting is disabled; set `stats = true` to enable it".yellow()
        );
    }
    Ok(())
}

/// Print the effective configuration as TOML
pub fn show_config(config: &Config) -> Result<()> {
    let toml = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("# cache directory: {}", config.cache_dir.display());
    println!("# config file: {}", config.config_file().display());
    print!("{}", toml);
    Ok(())
}
