use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use crate::cli::ConfigCommands;
use crate::config::{TestingConfig, CONFIG_FILE_NAME};
use crate::config_discovery::{discover_config, load_config_with_discovery};

pub fn run(command: ConfigCommands) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    match command {
        ConfigCommands::Show { config } => {
            let loaded = load_config_with_discovery(config.as_deref(), &cwd)?;
            if loaded.found {
                println!("# {}", loaded.path.display());
            } else {
                println!("# no configuration file found, using defaults");
            }
            println!("{}", toml::to_string_pretty(&loaded.config)?);
            Ok(())
        }
        ConfigCommands::Path => {
            match discover_config(&cwd)? {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("No {} found from {}", CONFIG_FILE_NAME, cwd.display()),
            }
            Ok(())
        }
        ConfigCommands::Init { force } => {
            let path = cwd.join(CONFIG_FILE_NAME);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            info!("Writing example configuration to {}", path.display());
            fs::write(&path, TestingConfig::example()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Created {}", path.display());
            Ok(())
        }
    }
}
