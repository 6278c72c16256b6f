/// Content-addressed store for captured sandbox outputs
///
/// Layout: `<data_dir>/mock-<label>-<fingerprint>/` holds a verbatim copy of
/// one run's output tree minus exclusions. Entries are written once and only
/// ever superseded as a whole.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::copy::{copy_dir_all, copy_files, CopyStats};
use super::exclusions::Exclusions;
use crate::digest::{Fingerprint, SandboxLayout};
use crate::error::CacheError;
use crate::logging::{operations, services, status};

const ENTRY_PREFIX: &str = "mock-";

/// One stored entry, as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub label: String,
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: usize,
    pub total_files: usize,
    pub total_size_bytes: u64,
}

/// Result of saving an entry
#[derive(Debug, Clone)]
pub struct SavedEntry {
    pub path: PathBuf,
    pub stats: CopyStats,
}

pub struct ContentStore {
    data_dir: PathBuf,
    layout: SandboxLayout,
}

impl ContentStore {
    /// Store rooted at `data_dir`. The directory itself is owned by the caller.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            layout: SandboxLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: SandboxLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the entry for `(label, fingerprint)`
    pub fn entry_dir(&self, label: &str, fingerprint: &Fingerprint) -> PathBuf {
        self.data_dir
            .join(format!("{ENTRY_PREFIX}{label}-{fingerprint}"))
    }

    /// True iff an entry for `(label, fingerprint)` is present.
    pub fn exists(&self, label: &str, fingerprint: &Fingerprint) -> bool {
        self.entry_dir(label, fingerprint).is_dir()
    }

    /// Capture `source_dir` as the entry for `(label, fingerprint)`.
    ///
    /// The tree is copied into a staging directory next to the entry and
    /// renamed into place once complete, so an interrupted save never leaves
    /// a half-written entry behind under the final name.
    pub fn save(
        &self,
        label: &str,
        fingerprint: &Fingerprint,
        source_dir: &Path,
        exclusions: &Exclusions,
    ) -> Result<SavedEntry> {
        let entry_dir = self.entry_dir(label, fingerprint);
        let staging = self.data_dir.join(format!(
            ".{ENTRY_PREFIX}{label}-{fingerprint}.partial.{}",
            std::process::id()
        ));

        if staging.exists() {
            fs::remove_dir_all(&staging).with_context(|| {
                format!("Failed to remove stale staging dir: {}", staging.display())
            })?;
        }

        let stats = match copy_files(source_dir, &staging, exclusions, &self.layout) {
            Ok(stats) => stats,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e.context(format!("Failed to capture {}", source_dir.display())));
            }
        };

        if entry_dir.exists() {
            fs::remove_dir_all(&entry_dir).with_context(|| {
                format!("Failed to remove superseded entry: {}", entry_dir.display())
            })?;
        }
        fs::rename(&staging, &entry_dir).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                staging.display(),
                entry_dir.display()
            )
        })?;

        info!(
            service = services::STORE,
            operation = operations::SAVE,
            status = status::SUCCESS,
            label,
            fingerprint = %fingerprint,
            file_count = stats.file_count,
            size_bytes = stats.size_bytes,
            "captured sandbox outputs"
        );

        Ok(SavedEntry {
            path: entry_dir,
            stats,
        })
    }

    /// Copy the entry's top-level items into `dest_dir`.
    ///
    /// Directories replace existing directories of the same name wholesale;
    /// files overwrite. Anything else in the entry is a [`CacheError::CorruptEntry`].
    pub fn restore(
        &self,
        label: &str,
        fingerprint: &Fingerprint,
        dest_dir: &Path,
    ) -> Result<CopyStats> {
        let entry_dir = self.entry_dir(label, fingerprint);
        if !entry_dir.is_dir() {
            return Err(CacheError::NotFound { path: entry_dir }.into());
        }

        let mut items = fs::read_dir(&entry_dir)
            .with_context(|| format!("Failed to read entry: {}", entry_dir.display()))?
            .map(|item| item.map(|item| item.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read entry: {}", entry_dir.display()))?;
        items.sort();

        let mut stats = CopyStats::default();
        for path in items {
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = dest_dir.join(name);

            if path.is_dir() {
                remove_existing(&target)?;
                let copied = copy_dir_all(&path, &target)?;
                stats.file_count += copied.file_count;
                stats.size_bytes += copied.size_bytes;
            } else if path.is_file() {
                if target.is_dir() {
                    remove_existing(&target)?;
                }
                stats.size_bytes += fs::copy(&path, &target)
                    .with_context(|| format!("Failed to restore {}", target.display()))?;
                stats.file_count += 1;
            } else {
                return Err(CacheError::CorruptEntry { path }.into());
            }
        }

        info!(
            service = services::STORE,
            operation = operations::RESTORE,
            status = status::HIT,
            label,
            fingerprint = %fingerprint,
            file_count = stats.file_count,
            "restored cached outputs"
        );

        Ok(stats)
    }

    /// Delete the entry so that the next save recreates it.
    ///
    /// Returns whether an entry was removed.
    pub fn regenerate(&self, label: &str, fingerprint: &Fingerprint) -> Result<bool> {
        let entry_dir = self.entry_dir(label, fingerprint);
        if !entry_dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&entry_dir)
            .with_context(|| format!("Failed to remove cache entry: {}", entry_dir.display()))?;
        info!(
            service = services::STORE,
            operation = operations::REGENERATE,
            label,
            fingerprint = %fingerprint,
            "removed cache entry for regeneration"
        );
        Ok(true)
    }

    /// List all entries, sorted by label then fingerprint
    pub fn list(&self) -> Result<Vec<EntryInfo>> {
        let mut entries = Vec::new();

        if !self.data_dir.exists() {
            return Ok(entries);
        }

        for item in fs::read_dir(&self.data_dir)
            .with_context(|| format!("Failed to read data directory: {}", self.data_dir.display()))?
        {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            let name = item.file_name();
            let Some((label, fingerprint)) = name.to_str().and_then(parse_entry_name) else {
                debug!(name = ?name, "skipping foreign directory in data dir");
                continue;
            };
            entries.push(EntryInfo {
                label: label.to_string(),
                fingerprint: Fingerprint::from_hex(fingerprint),
                path: item.path(),
            });
        }

        entries.sort_by(|a, b| {
            (a.label.as_str(), a.fingerprint.as_str()).cmp(&(b.label.as_str(), b.fingerprint.as_str()))
        });
        Ok(entries)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        for entry in self.list()? {
            stats.total_entries += 1;
            for file in walkdir::WalkDir::new(&entry.path) {
                let file = file?;
                if file.file_type().is_file() {
                    stats.total_files += 1;
                    stats.total_size_bytes += file.metadata()?.len();
                }
            }
        }

        Ok(stats)
    }

    /// Remove all entries, or only those of `label`. Returns the number removed.
    pub fn clean(&self, label: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        for entry in self.list()? {
            if label.is_some_and(|l| l != entry.label) {
                continue;
            }
            fs::remove_dir_all(&entry.path)
                .with_context(|| format!("Failed to remove cache entry: {}", entry.path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Split `mock-<label>-<fingerprint>` into label and fingerprint.
fn parse_entry_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(ENTRY_PREFIX)?;
    let (label, fingerprint) = rest.rsplit_once('-')?;
    if label.is_empty()
        || fingerprint.is_empty()
        || !fingerprint.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    Some((label, fingerprint))
}

fn remove_existing(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return Ok(());
    };
    result.with_context(|| format!("Failed to replace {}", path.display()))
}
