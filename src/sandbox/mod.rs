/// Executable sandbox runner
///
/// `reprise-mock` is installed in place of a real code. The engine invokes it
/// from a launch script inside a prepared sandbox; it fingerprints the
/// sandbox, replays stored outputs on a hit, and otherwise runs the real
/// executable and stores what it produced.
pub mod env;
pub mod executor;
pub mod factory;
pub mod runner;
pub mod spec;

pub use env::EnvKey;
pub use executor::{BashExecutor, ExecutionResult, LaunchExecutor};
pub use factory::{MockCode, MockCodeFactory, MockOptions};
pub use runner::{Outcome, SandboxRunner};
pub use spec::LaunchSpec;

use anyhow::{Context, Result};

/// Serve one invocation from the process environment in the current directory.
pub fn run_from_env() -> Result<Outcome> {
    let spec = LaunchSpec::from_env()?;
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    SandboxRunner::new().run(&spec, &cwd)
}
