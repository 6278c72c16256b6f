/// `reprise archive` command implementation
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::cli::ArchiveCommands;
use crate::cli_utils::format_size;
use crate::config_discovery::load_config_with_discovery;
use crate::graph::archive::read_bundle;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

pub fn run(command: &ArchiveCommands) -> Result<()> {
    match command {
        ArchiveCommands::List { dir, config } => {
            let root = match dir {
                Some(dir) => dir.clone(),
                None => {
                    let cwd = std::env::current_dir().context("Failed to get current directory")?;
                    load_config_with_discovery(config.as_deref(), &cwd)?.archive_root()
                }
            };
            list(&root)
        }
        ArchiveCommands::Inspect { path } => inspect(path),
    }
}

fn list(root: &Path) -> Result<()> {
    if !root.is_dir() {
        println!("No archives in {}", root.display());
        return Ok(());
    }

    let mut archives = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX)
        {
            archives.push(entry.into_path());
        }
    }

    if archives.is_empty() {
        println!("No archives in {}", root.display());
        return Ok(());
    }

    println!("Archives in {} ({} archives):", root.display(), archives.len());
    println!();
    for path in archives {
        let name = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        match read_bundle(&path) {
            Ok((metadata, _)) => println!(
                "  {name}  {} nodes, {} links, {}",
                metadata.node_count,
                metadata.link_count,
                format_size(size)
            ),
            Err(e) => println!("  {name}  unreadable: {e}"),
        }
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let (metadata, data) = read_bundle(path)?;

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for node in &data.nodes {
        *by_type.entry(node.node_type.as_str()).or_default() += 1;
    }

    println!("Archive: {}", path.display());
    println!("Format version: {}", metadata.format_version);
    println!(
        "Created: {}",
        metadata.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("Nodes: {}", metadata.node_count);
    println!("Links: {}", metadata.link_count);
    for (node_type, count) in by_type {
        println!("  {node_type}: {count}");
    }
    println!("Roots:");
    for root in &metadata.roots {
        println!("  {root}");
    }
    Ok(())
}
