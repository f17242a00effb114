pub mod app;
pub mod cache;
pub mod cli;
pub mod constants;
pub mod runtime;
pub mod signature;
pub mod utils;

pub use app::{load_config, Config};
pub use cache::{CacheStore, Fingerprint};
pub use runtime::{CapturedOutput, Orchestrator, OutputSource, RunOutcome};
pub use signature::SignatureEngine;
pub use utils::{BincacheError, ExecError};
