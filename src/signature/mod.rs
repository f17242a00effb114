// Gateway module for signature - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod engine;
mod hashing;
mod resolver;

// Public re-exports - the ONLY way to access signature functionality
pub use engine::{signature_source, DependencyRecord, SignatureEngine};
pub use hashing::{hash_file, hash_text};
pub use resolver::{parse_ldd_output, DependencyResolver, LddResolver, LinkedLibrary};
