/// Provenance store contract
///
/// The snapshot cache never looks inside the provenance graph. It relies on
/// the store to hash, export, import and run computations, and only decides
/// when each of those happens.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::path::Path;

use crate::digest::{EntityHashing, Inputs, NodeId};

/// Name of a kind of computation, e.g. `DiffCalculation`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputationKind(String);

impl ComputationKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComputationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComputationKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Which computations may be served from earlier equivalent results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CachingScope {
    #[default]
    Disabled,
    All,
    Only(ComputationKind),
}

impl CachingScope {
    pub fn allows(&self, kind: &ComputationKind) -> bool {
        match self {
            CachingScope::Disabled => false,
            CachingScope::All => true,
            CachingScope::Only(only) => only == kind,
        }
    }
}

/// How imported extras meet extras of nodes already in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtrasMode {
    /// Existing nodes keep their extras untouched
    KeepExisting,
    /// Existing keys win, keys only present in the archive are added
    #[default]
    KeepExistingImportNew,
    /// Archive values replace existing ones
    Overwrite,
}

/// Merge behaviour on import
///
/// Nodes already present are never replaced. Comments are merged without
/// duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergePolicy {
    pub extras: ExtrasMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub nodes: usize,
    pub links: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub archives: usize,
    pub new_nodes: usize,
    pub existing_nodes: usize,
    pub new_links: usize,
}

impl AddAssign for ImportSummary {
    fn add_assign(&mut self, other: Self) {
        self.archives += other.archives;
        self.new_nodes += other.new_nodes;
        self.existing_nodes += other.existing_nodes;
        self.new_links += other.new_links;
    }
}

/// Capabilities the snapshot cache needs from the provenance store.
pub trait ProvenanceStore: EntityHashing {
    /// Recompute the stored hash of every process node; returns how many.
    fn rehash_processes(&mut self) -> Result<usize>;

    /// Write `roots` and everything they need to be understood to `path`.
    fn export_archive(&mut self, roots: &[NodeId], path: &Path) -> Result<ExportSummary>;

    /// Merge one archive file into the store.
    fn import_archive(&mut self, path: &Path, policy: MergePolicy) -> Result<ImportSummary>;

    fn caching(&self) -> CachingScope;

    fn set_caching(&mut self, scope: CachingScope);

    /// Run a computation of `kind`, returning its process node.
    fn run(&mut self, kind: &ComputationKind, inputs: &Inputs) -> Result<NodeId>;

    /// Process nodes of finished computations, optionally of one kind only.
    fn result_nodes(&self, kind: Option<&ComputationKind>) -> Vec<NodeId>;
}
