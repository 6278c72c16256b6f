/// `reprise prepend` command implementation
///
/// Prints the export lines a workflow engine puts at the top of a launch
/// script so that `reprise-mock` serves the invocation.
use anyhow::{Context, Result};

use crate::cli::PrependArgs;
use crate::cli_utils::reprise_prefix;
use crate::config_discovery::load_config_with_discovery;
use crate::sandbox::{MockCodeFactory, MockOptions};

pub fn run(args: &PrependArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let loaded = load_config_with_discovery(args.config.as_deref(), &cwd)?;

    let mut factory = match &args.mock_executable {
        Some(path) => MockCodeFactory::with_mock_executable(
            loaded.config,
            args.config_action,
            args.regenerate,
            path,
        ),
        None => MockCodeFactory::new(loaded.config, args.config_action, args.regenerate)?,
    };

    let options = MockOptions {
        ignore_files: (!args.ignore_files.is_empty()).then(|| args.ignore_files.clone()),
        ignore_paths: args.ignore_paths.clone(),
        executable_name: args.executable_name.clone(),
    };
    let code = factory.create(&args.label, &args.data_dir, options)?;

    print!("{}", code.prepend_text());
    if !args.args.is_empty() {
        let launch_args: Vec<&str> = args.args.iter().map(String::as_str).collect();
        println!();
        println!("{}", code.launch_line(&launch_args));
    }

    if factory.finish(&loaded.path)? {
        eprintln!(
            "{} Wrote configuration to {}",
            reprise_prefix(),
            loaded.path.display()
        );
    }

    Ok(())
}
