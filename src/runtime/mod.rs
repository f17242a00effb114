// Gateway module for runtime - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod executor;
mod orchestrator;
mod policy;

// Public re-exports - the ONLY way to access runtime functionality
pub use executor::{CapturedOutput, CommandExecutor, ProcessExecutor};
pub use orchestrator::{resolve_command, Orchestrator, OutputSource, RunOutcome};
pub use policy::CachePolicy;
