/// Graph snapshot cache
///
/// Results of expensive computations are kept as archives in a directory
/// checked into the test suite. An archive is looked up by a fingerprint of
/// the computation's inputs; when present it is loaded and the store's
/// caching serves the computation from it, otherwise the computation runs and
/// its provenance is exported for next time.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::provenance::{
    CachingScope, ComputationKind, ExportSummary, ImportSummary, MergePolicy, ProvenanceStore,
};
use crate::digest::{fingerprint_inputs, flatten_inputs, Fingerprint, InputValue, Inputs, NodeId};
use crate::error::CacheError;
use crate::logging::{operations, services, status};

/// Enables a caching scope on a store for as long as it lives.
///
/// The previous scope is restored on drop, including when the guarded code
/// returns early with an error.
pub struct CachingGuard<'a, S: ProvenanceStore + ?Sized> {
    store: &'a mut S,
    previous: CachingScope,
}

impl<'a, S: ProvenanceStore + ?Sized> CachingGuard<'a, S> {
    pub fn enable(store: &'a mut S, scope: CachingScope) -> Self {
        let previous = store.caching();
        store.set_caching(scope);
        Self { store, previous }
    }
}

impl<S: ProvenanceStore + ?Sized> Deref for CachingGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: ProvenanceStore + ?Sized> DerefMut for CachingGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.store
    }
}

impl<S: ProvenanceStore + ?Sized> Drop for CachingGuard<'_, S> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        self.store.set_caching(previous);
    }
}

/// `<label><Kind>-nodes-<fingerprint>.tar.gz`
pub fn archive_name(label: &str, kind: &ComputationKind, fingerprint: &Fingerprint) -> String {
    format!("{label}{}-nodes-{fingerprint}.tar.gz", kind.name())
}

/// Export `roots` and their provenance to `path`.
///
/// Process hashes are recomputed first so the export reflects the current
/// hashing rules.
pub fn export<S: ProvenanceStore + ?Sized>(
    store: &mut S,
    roots: &[NodeId],
    path: &Path,
) -> Result<ExportSummary> {
    let rehashed = store.rehash_processes()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let summary = store.export_archive(roots, path)?;
    info!(
        service = services::GRAPH,
        operation = operations::EXPORT,
        status = status::SUCCESS,
        path = %path.display(),
        nodes = summary.nodes,
        links = summary.links,
        rehashed,
        "exported provenance snapshot"
    );
    Ok(summary)
}

/// Import the archive at `path`, or every archive below it if it is a directory.
///
/// Existing nodes are kept; new ones are added. Process hashes are
/// recomputed afterwards so imported results can serve later computations.
pub fn load<S: ProvenanceStore + ?Sized>(store: &mut S, path: &Path) -> Result<ImportSummary> {
    load_with(store, path, MergePolicy::default())
}

pub fn load_with<S: ProvenanceStore + ?Sized>(
    store: &mut S,
    path: &Path,
    policy: MergePolicy,
) -> Result<ImportSummary> {
    if !path.exists() {
        return Err(CacheError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let mut total = ImportSummary::default();
    if path.is_file() {
        total += store.import_archive(path, policy)?;
    } else if path.is_dir() {
        for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            if !entry.path().is_file() {
                return Err(CacheError::InvalidArchive {
                    path: entry.path().to_path_buf(),
                    reason: "neither a file nor a directory".to_string(),
                }
                .into());
            }
            debug!(path = %entry.path().display(), "importing archive");
            total += store.import_archive(entry.path(), policy)?;
        }
    } else {
        return Err(CacheError::InvalidArchive {
            path: path.to_path_buf(),
            reason: "neither a file nor a directory".to_string(),
        }
        .into());
    }

    let rehashed = store.rehash_processes()?;
    info!(
        service = services::GRAPH,
        operation = operations::LOAD,
        status = status::SUCCESS,
        path = %path.display(),
        archives = total.archives,
        new_nodes = total.new_nodes,
        existing_nodes = total.existing_nodes,
        rehashed,
        "loaded provenance snapshot"
    );
    Ok(total)
}

/// Result of [`run_with_cache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRun {
    pub process: NodeId,
    pub fingerprint: Fingerprint,
    pub archive: PathBuf,
    /// True if the archive existed and was loaded
    pub loaded: bool,
}

/// Run `kind` on `inputs`, backed by an archive under `archive_root`.
///
/// The archive name is derived from `label`, `kind` and the fingerprint of
/// `inputs`. An existing archive is loaded before running with caching
/// enabled; a missing one is written afterwards. The store's caching scope
/// is restored before returning.
pub fn run_with_cache<S: ProvenanceStore + ?Sized>(
    store: &mut S,
    inputs: &Inputs,
    kind: &ComputationKind,
    label: &str,
    archive_root: &Path,
) -> Result<CachedRun> {
    for (key, leaf) in flatten_inputs(inputs) {
        if let InputValue::Entity(id) = leaf {
            if !store.is_stored(*id) {
                store
                    .store(*id)
                    .with_context(|| format!("Failed to store input '{key}'"))?;
            }
        }
    }

    let fingerprint = fingerprint_inputs(store, inputs)?;
    let archive = archive_root.join(archive_name(label, kind, &fingerprint));
    let loaded = archive.is_file();

    if loaded {
        load(store, &archive)?;
    }
    info!(
        service = services::GRAPH,
        operation = operations::RUN,
        status = if loaded { status::HIT } else { status::MISS },
        kind = %kind,
        fingerprint = %fingerprint,
        archive = %archive.display(),
        "running with snapshot cache"
    );

    let process = {
        let mut guard = CachingGuard::enable(store, CachingScope::All);
        guard.run(kind, inputs)?
    };

    if !loaded {
        export(store, &[process], &archive)?;
    }

    Ok(CachedRun {
        process,
        fingerprint,
        archive,
        loaded,
    })
}

/// Run `body` with caching enabled, backed by the archive at `archive_path`.
///
/// With `kind` set only that kind is cached and only its results are
/// exported; otherwise all kinds are. The archive is loaded if present and
/// written only if it was missing, containing the results `body` produced.
pub fn with_cache<S, T, F>(
    store: &mut S,
    archive_path: &Path,
    kind: Option<&ComputationKind>,
    body: F,
) -> Result<T>
where
    S: ProvenanceStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    let loaded = archive_path.exists();
    if loaded {
        load(store, archive_path)?;
    }

    let before: HashSet<NodeId> = store.result_nodes(kind).into_iter().collect();
    let scope = kind.map_or(CachingScope::All, |k| CachingScope::Only(k.clone()));

    let value = {
        let mut guard = CachingGuard::enable(store, scope);
        body(&mut *guard)?
    };

    if !loaded {
        let created: Vec<NodeId> = store
            .result_nodes(kind)
            .into_iter()
            .filter(|id| !before.contains(id))
            .collect();
        export(store, &created, archive_path)?;
    }

    Ok(value)
}
