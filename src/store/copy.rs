/// Tree copies between sandboxes and store entries
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::exclusions::Exclusions;
use crate::digest::SandboxLayout;

/// Totals of a copy operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub file_count: usize,
    pub size_bytes: u64,
}

/// Copy the sandbox tree `src_dir` into `dest_dir`, preserving structure.
///
/// Skips the bookkeeping subtree, files excluded by name or path, and whole
/// directories excluded by path. `dest_dir` may already contain files; they
/// are overwritten where the source has the same path.
pub fn copy_files(
    src_dir: &Path,
    dest_dir: &Path,
    exclusions: &Exclusions,
    layout: &SandboxLayout,
) -> Result<CopyStats> {
    let mut stats = CopyStats::default();

    let walker = WalkDir::new(src_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = entry.path().strip_prefix(src_dir).unwrap_or(entry.path());
            !layout.is_bookkeeping(rel) && !exclusions.excludes_path(rel)
        });

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", src_dir.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .context("Walked path outside of the source root")?;
        let target = dest_dir.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
            continue;
        }

        if !entry.path().is_file() || layout.is_bookkeeping(rel) || exclusions.excludes(rel) {
            continue;
        }

        let bytes = fs::copy(entry.path(), &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                entry.path().display(),
                target.display()
            )
        })?;
        stats.file_count += 1;
        stats.size_bytes += bytes;
    }

    Ok(stats)
}

/// Recursively copy a directory.
pub fn copy_dir_all(src: &Path, dest: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .context("Walked path outside of the source root")?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else if entry.path().is_file() {
            stats.size_bytes += fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy to {}", target.display()))?;
            stats.file_count += 1;
        }
    }

    Ok(stats)
}
