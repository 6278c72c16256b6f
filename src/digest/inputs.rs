/// Input-mapping fingerprints
///
/// A computation's inputs form a nested mapping whose leaves are plain values,
/// stored entities, or executable placeholders. The mapping is flattened into
/// dotted keys, sorted, and each leaf contributes a sub-hash to one SHA-256
/// accumulator. Executables are skipped since tests substitute mocks for them.
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use super::{sha256_hex, Fingerprint};
use crate::error::CacheError;

/// Identity of a node owned by the provenance store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One value of an input mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    /// Plain value, hashed through its canonical JSON form
    Scalar(Value),
    /// Stored entity, hashed through the store's content hash
    Entity(NodeId),
    /// Executable identity; never part of a fingerprint
    Executable(NodeId),
    /// Nested namespace
    Nested(Inputs),
}

/// Named inputs in insertion order.
pub type Inputs = IndexMap<String, InputValue>;

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Scalar(value)
    }
}

impl From<Inputs> for InputValue {
    fn from(value: Inputs) -> Self {
        InputValue::Nested(value)
    }
}

/// Hashing capabilities the digest engine needs from the store owning entities.
pub trait EntityHashing {
    /// True if `id` is already persisted.
    fn is_stored(&self, id: NodeId) -> bool;

    /// Persist `id` so that it gets a stable content hash.
    fn store(&mut self, id: NodeId) -> Result<()>;

    /// Content hash of a persisted entity.
    fn content_hash(&self, id: NodeId) -> Result<String>;
}

/// Flatten nested namespaces into `(dotted_key, leaf)` pairs sorted by key.
///
/// Empty namespaces contribute no pairs.
pub fn flatten_inputs(inputs: &Inputs) -> Vec<(String, &InputValue)> {
    fn visit<'a>(prefix: &str, inputs: &'a Inputs, out: &mut Vec<(String, &'a InputValue)>) {
        for (key, value) in inputs {
            let dotted = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                InputValue::Nested(children) => visit(&dotted, children, out),
                leaf => out.push((dotted, leaf)),
            }
        }
    }

    let mut leaves = Vec::new();
    visit("", inputs, &mut leaves);
    leaves.sort_by(|a, b| a.0.cmp(&b.0));
    leaves
}

/// Fingerprint an input mapping.
///
/// Entities that are not yet persisted are stored first; an entity whose
/// content hash can not be obtained fails with [`CacheError::HashUnavailable`].
pub fn fingerprint_inputs<H: EntityHashing + ?Sized>(
    hashing: &mut H,
    inputs: &Inputs,
) -> Result<Fingerprint> {
    let mut hasher = Sha256::new();

    for (key, leaf) in flatten_inputs(inputs) {
        let sub_hash = match leaf {
            // Namespaces are already flattened into their leaves
            InputValue::Executable(_) | InputValue::Nested(_) => continue,
            InputValue::Entity(id) => entity_hash(hashing, *id)?,
            InputValue::Scalar(value) => sha256_hex(canonical_json(value).as_bytes()),
        };
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(sub_hash.as_bytes());
        hasher.update([0u8]);
    }

    Ok(Fingerprint::from_hasher(hasher))
}

fn entity_hash<H: EntityHashing + ?Sized>(hashing: &mut H, id: NodeId) -> Result<String> {
    let unavailable = |err: anyhow::Error| CacheError::HashUnavailable {
        entity: id.to_string(),
        reason: format!("{err:#}"),
    };

    if !hashing.is_stored(id) {
        hashing.store(id).map_err(unavailable)?;
    }
    Ok(hashing.content_hash(id).map_err(unavailable)?)
}

/// JSON text with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
