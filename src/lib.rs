// Library interface for reprise
// Test suites and the two binaries share these modules

pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod digest;
pub mod error;
pub mod graph;
pub mod logging;
pub mod sandbox;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigAction, TestingConfig};
pub use config_discovery::discover_config;
pub use digest::{fingerprint_directory, fingerprint_inputs, Fingerprint, InputValue, Inputs, NodeId};
pub use error::CacheError;
pub use sandbox::{LaunchSpec, MockCode, MockCodeFactory, Outcome, SandboxRunner};
pub use store::{ContentStore, Exclusions};
