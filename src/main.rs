use clap::Parser;
use tracing::{info_span, warn};

use bincache::{
    app::{default_cache_dir, load_config, Config},
    cli::{handle_action, Cli},
    constants::APP_NAME,
    utils::init_logger,
};

fn main() {
    let cli = Cli::parse();

    // Without a usable cache location the command still runs, just uncached
    let mut startup_warnings = Vec::new();
    let cache_dir = match cli.cache_dir.clone() {
        Some(dir) => dir,
        None => default_cache_dir().unwrap_or_else(|e| {
            startup_warnings.push(format!("{:#}", e));
            std::env::temp_dir().join(APP_NAME)
        }),
    };

    let config = load_config(&cache_dir).unwrap_or_else(|e| {
        startup_warnings.push(format!("Invalid configuration, using defaults: {:#}", e));
        Config::with_cache_dir(&cache_dir)
    });

    init_logger(&config);
    for warning in &startup_warnings {
        warn!("{}", warning);
    }

    let span = info_span!("bincache", pid = std::process::id());
    let code = span.in_scope(|| handle_action(&cli.action(), &config));
    std::process::exit(code);
}

