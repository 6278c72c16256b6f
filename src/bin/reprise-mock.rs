//! Stand-in executable referenced from launch scripts
//!
//! Reads the mock contract from the environment and serves the invocation
//! in the current directory: stored outputs are replayed, otherwise the real
//! executable runs and its outputs are stored.

use std::process::ExitCode;

use reprise::cli_utils::reprise_prefix;
use reprise::{logging, sandbox};

fn main() -> ExitCode {
    logging::init();

    match sandbox::run_from_env() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", reprise_prefix(), e);
            ExitCode::FAILURE
        }
    }
}
