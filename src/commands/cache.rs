/// `reprise cache` command implementation
///
/// Manages stored sandbox outputs (list, stats, remove, clean).
use anyhow::{Context, Result};

use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{format_size, reprise_prefix};
use crate::digest::Fingerprint;
use crate::store::ContentStore;

pub fn run(args: &CacheArgs) -> Result<()> {
    let store = ContentStore::new(&args.data_dir);

    match &args.command {
        CacheCommands::List { label } => list(&store, label.as_deref()),
        CacheCommands::Stats => stats(&store),
        CacheCommands::Remove { label, fingerprint } => remove(&store, label, fingerprint),
        CacheCommands::Clean { label, all } => clean(&store, label.as_deref(), *all),
    }
}

/// List stored entries
fn list(store: &ContentStore, label: Option<&str>) -> Result<()> {
    let entries = store.list().context("Failed to list cache entries")?;
    let entries: Vec<_> = entries
        .into_iter()
        .filter(|e| label.is_none_or(|l| e.label == l))
        .collect();

    if entries.is_empty() {
        println!("No stored entries.");
        return Ok(());
    }

    println!("Stored entries ({} entries):", entries.len());
    println!();
    for entry in entries {
        println!("  {} {}", entry.label, entry.fingerprint);
        println!("    Path: {}", entry.path.display());
    }

    Ok(())
}

/// Show store statistics
fn stats(store: &ContentStore) -> Result<()> {
    let stats = store.stats().context("Failed to get cache statistics")?;

    println!("Store Statistics");
    println!();
    println!("Data directory: {}", store.data_dir().display());
    println!("Total entries: {}", stats.total_entries);
    println!("Total size: {}", format_size(stats.total_size_bytes));
    println!("Total files: {}", stats.total_files);

    Ok(())
}

fn remove(store: &ContentStore, label: &str, fingerprint: &str) -> Result<()> {
    let fingerprint = Fingerprint::from_hex(fingerprint);
    if !store.regenerate(label, &fingerprint)? {
        anyhow::bail!("No entry for {label} {fingerprint}");
    }
    println!("{} Removed {} {}", reprise_prefix(), label, fingerprint);
    Ok(())
}

/// Clean entries of a label or all entries
fn clean(store: &ContentStore, label: Option<&str>, all: bool) -> Result<()> {
    if label.is_none() && !all {
        anyhow::bail!("Specify --all to clean all entries, or provide --label");
    }

    let removed = store
        .clean(if all { None } else { label })
        .context("Failed to clean entries")?;
    println!("{} Removed {} entries.", reprise_prefix(), removed);

    Ok(())
}
