/// `reprise fingerprint` command implementation
use anyhow::{Context, Result};

use crate::cli::FingerprintArgs;
use crate::digest::{fingerprint_directory_with, SandboxLayout};

pub fn run(args: &FingerprintArgs) -> Result<()> {
    if !args.dir.is_dir() {
        anyhow::bail!("Not a directory: {}", args.dir.display());
    }

    let layout = SandboxLayout {
        launch_script: args.launch_script.clone(),
        bookkeeping_dir: args.bookkeeping_dir.clone(),
    };
    let fingerprint = fingerprint_directory_with(&args.dir, &layout)
        .with_context(|| format!("Failed to fingerprint {}", args.dir.display()))?;

    println!("{fingerprint}");
    Ok(())
}
