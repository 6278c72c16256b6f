//! Content-addressed store for executable outputs
//!
//! Maps `(label, fingerprint)` to a directory of captured result files.
pub mod content;
pub mod copy;
pub mod exclusions;

pub use content::{ContentStore, EntryInfo, SavedEntry, StoreStats};
pub use copy::{copy_files, CopyStats};
pub use exclusions::Exclusions;
