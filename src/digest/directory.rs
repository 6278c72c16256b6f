/// Directory fingerprints
///
/// Hashes every regular file of a prepared sandbox in sorted path order,
/// feeding the relative path and the SHA-256 of each file's content into one
/// accumulator. The engine's bookkeeping subtree is skipped and the launch
/// script is normalized first (see [`super::launch_script`]).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::launch_script::strip_launch_script;
use super::Fingerprint;
use crate::logging::{operations, services};

/// Default name of the launch script generated by the workflow engine.
pub const DEFAULT_LAUNCH_SCRIPT: &str = "_submit.sh";

/// Default name of the engine's bookkeeping directory inside a sandbox.
pub const DEFAULT_BOOKKEEPING_DIR: &str = ".engine";

/// Names of the two special entries of a sandbox directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLayout {
    /// Launch script, normalized before hashing and rewritten before a real run
    pub launch_script: String,
    /// Top-level directory owned by the engine; never hashed, saved or restored
    pub bookkeeping_dir: String,
}

impl Default for SandboxLayout {
    fn default() -> Self {
        Self {
            launch_script: DEFAULT_LAUNCH_SCRIPT.to_string(),
            bookkeeping_dir: DEFAULT_BOOKKEEPING_DIR.to_string(),
        }
    }
}

impl SandboxLayout {
    /// True if `rel_path` (relative to the sandbox root) lies in the bookkeeping subtree
    pub fn is_bookkeeping(&self, rel_path: &Path) -> bool {
        rel_path
            .components()
            .next()
            .is_some_and(|first| first.as_os_str() == self.bookkeeping_dir.as_str())
    }

    fn is_launch_script(&self, rel_path: &Path) -> bool {
        rel_path.parent() == Some(Path::new("")) && rel_path == Path::new(&self.launch_script)
    }
}

/// Fingerprint `root` using the default sandbox layout.
pub fn fingerprint_directory(root: &Path) -> Result<Fingerprint> {
    fingerprint_directory_with(root, &SandboxLayout::default())
}

/// Fingerprint `root` with an explicit sandbox layout.
///
/// A missing `root` hashes like an empty directory; checking that it exists
/// is the caller's business.
pub fn fingerprint_directory_with(root: &Path, layout: &SandboxLayout) -> Result<Fingerprint> {
    let mut hasher = Sha256::new();

    if !root.exists() {
        return Ok(Fingerprint::from_hasher(hasher));
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1
                || !(entry.file_type().is_dir()
                    && entry.file_name() == layout.bookkeeping_dir.as_str())
        });

    let mut file_count = 0usize;
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.path().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .context("Walked path outside of the sandbox root")?;

        let mut content = fs::read(entry.path())
            .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
        if layout.is_launch_script(rel_path) {
            content = strip_launch_script(&content);
        }

        hasher.update(relative_key(rel_path).as_bytes());
        hasher.update([0u8]);
        hasher.update(Sha256::digest(&content));
        file_count += 1;
    }

    let fingerprint = Fingerprint::from_hasher(hasher);
    debug!(
        service = services::SANDBOX,
        operation = operations::FINGERPRINT,
        path = %root.display(),
        file_count,
        fingerprint = %fingerprint,
        "fingerprinted directory"
    );
    Ok(fingerprint)
}

/// Platform-independent spelling of a relative path
pub(crate) fn relative_key(rel_path: &Path) -> String {
    rel_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
