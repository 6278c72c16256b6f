/// Graph snapshot cache
pub mod archive;
pub mod memory;
pub mod policy;
pub mod provenance;
pub mod snapshot;

pub use memory::{Computation, Link, LinkKind, MemoryProvenance, Node, NodeClass, RunContext};
pub use policy::{FieldFilter, HashPolicy};
pub use provenance::{
    CachingScope, ComputationKind, ExportSummary, ExtrasMode, ImportSummary, MergePolicy,
    ProvenanceStore,
};
pub use snapshot::{
    archive_name, export, load, load_with, run_with_cache, with_cache, CachedRun, CachingGuard,
};
