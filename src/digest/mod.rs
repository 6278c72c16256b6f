//! Digest engine
//!
//! Canonicalizes a sandbox directory or a structured input mapping into a
//! deterministic SHA-256 fingerprint after stripping known-volatile content.
pub mod directory;
pub mod inputs;
pub mod launch_script;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub use directory::{fingerprint_directory, fingerprint_directory_with, SandboxLayout};
pub use inputs::{
    fingerprint_inputs, flatten_inputs, EntityHashing, InputValue, Inputs, NodeId,
};
pub use launch_script::{rewrite_launch_script, strip_launch_script, MOCK_EXECUTABLE_NAME};

/// Hex-encoded SHA-256 digest used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already computed hex digest, e.g. one parsed from a directory name.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 of `data`, hex-encoded
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
