use anyhow::Result;
use clap::Parser;

use reprise::cli::{Cli, Commands};
use reprise::{commands, logging};

fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Fingerprint(args) => commands::fingerprint::run(&args),
        Commands::Cache(args) => commands::cache::run(&args),
        Commands::Prepend(args) => commands::prepend::run(&args),
        Commands::Archive(args) => commands::archive::run(&args.command),
        Commands::Config(args) => commands::config::run(args.command),
    }
}
