/// In-memory provenance store
///
/// A small provenance graph of data, code and process nodes connected by
/// typed links. Computations are registered by kind and run through
/// [`ProvenanceStore::run`]; when caching is enabled for a kind, a finished
/// process with the same hash supplies copies of its outputs instead of a
/// new execution.
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::archive::{read_bundle, write_bundle, BundleData, BundleMetadata};
use super::policy::HashPolicy;
use super::provenance::{
    CachingScope, ComputationKind, ExportSummary, ExtrasMode, ImportSummary, MergePolicy,
    ProvenanceStore,
};
use crate::digest::inputs::canonical_json;
use crate::digest::{flatten_inputs, EntityHashing, InputValue, Inputs, NodeId};
use crate::error::CacheError;
use crate::logging::{operations, services, status};

/// Extra holding the hash of a process node
pub const HASH_EXTRA: &str = "_hash";
/// Extra naming the process whose outputs a cached process copied
pub const CACHE_SOURCE_EXTRA: &str = "_cache_source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Data,
    Code,
    Process,
}

impl NodeClass {
    fn as_str(self) -> &'static str {
        match self {
            NodeClass::Data => "data",
            NodeClass::Code => "code",
            NodeClass::Process => "process",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Finished,
    Excepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub class: NodeClass,
    pub node_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub extras: Map<String, Value>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ProcessState>,
    #[serde(skip)]
    stored: bool,
}

impl Node {
    pub fn new(class: NodeClass, node_type: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: NodeId::new(),
            class,
            node_type: node_type.into(),
            attributes,
            extras: Map::new(),
            comments: Vec::new(),
            state: None,
            stored: false,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }
}

/// Link kinds; `Input` points from data to process, the others from a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Input,
    Create,
    Call,
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: LinkKind,
    pub label: String,
}

/// A kind of computation the store can run
pub trait Computation {
    fn kind(&self) -> ComputationKind;

    /// Whether equivalent earlier results may stand in for an execution
    fn cacheable(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()>;
}

pub struct MemoryProvenance {
    nodes: IndexMap<NodeId, Node>,
    links: Vec<Link>,
    computations: HashMap<ComputationKind, Arc<dyn Computation>>,
    policy: HashPolicy,
    caching: CachingScope,
    executions: HashMap<ComputationKind, usize>,
}

impl Default for MemoryProvenance {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvenance {
    pub fn new() -> Self {
        Self::with_policy(HashPolicy::recommended())
    }

    pub fn with_policy(policy: HashPolicy) -> Self {
        Self {
            nodes: IndexMap::new(),
            links: Vec::new(),
            computations: HashMap::new(),
            policy,
            caching: CachingScope::Disabled,
            executions: HashMap::new(),
        }
    }

    pub fn register<C: Computation + 'static>(&mut self, computation: C) {
        self.computations
            .insert(computation.kind(), Arc::new(computation));
    }

    /// New unstored data node; `attributes` must be a JSON object.
    pub fn create_data(&mut self, node_type: &str, attributes: Value) -> Result<NodeId> {
        self.insert(NodeClass::Data, node_type, attributes)
    }

    pub fn create_code(&mut self, attributes: Value) -> Result<NodeId> {
        self.insert(NodeClass::Code, "code", attributes)
    }

    fn insert(&mut self, class: NodeClass, node_type: &str, attributes: Value) -> Result<NodeId> {
        let Value::Object(attributes) = attributes else {
            bail!("Node attributes must be a JSON object");
        };
        let node = Node::new(class, node_type, attributes);
        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .with_context(|| format!("Unknown node {id}"))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Drop every node and link, keeping registrations and hash policy.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.executions.clear();
    }

    /// Real executions of `kind` so far; cache hits do not count.
    pub fn executions(&self, kind: &ComputationKind) -> usize {
        self.executions.get(kind).copied().unwrap_or(0)
    }

    /// Node created or returned by `process` under `label`
    pub fn output(&self, process: NodeId, label: &str) -> Option<NodeId> {
        self.links
            .iter()
            .find(|l| {
                l.source == process
                    && l.label == label
                    && matches!(l.kind, LinkKind::Create | LinkKind::Return)
            })
            .map(|l| l.target)
    }

    /// Processes called by `process`
    pub fn called(&self, process: NodeId) -> Vec<NodeId> {
        self.links
            .iter()
            .filter(|l| l.source == process && l.kind == LinkKind::Call)
            .map(|l| l.target)
            .collect()
    }

    pub fn cache_source(&self, process: NodeId) -> Option<NodeId> {
        self.nodes
            .get(&process)?
            .extras
            .get(CACHE_SOURCE_EXTRA)?
            .as_str()?
            .parse()
            .ok()
            .map(NodeId)
    }

    pub fn set_extra(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        self.node_mut(id)?.extras.insert(key.to_string(), value);
        Ok(())
    }

    pub fn add_comment(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.node_mut(id)?.comments.push(text.to_string());
        Ok(())
    }

    fn set_state(&mut self, id: NodeId, state: ProcessState) -> Result<()> {
        self.node_mut(id)?.state = Some(state);
        Ok(())
    }

    fn node_hash(&self, id: NodeId) -> Result<String> {
        let node = self
            .nodes
            .get(&id)
            .with_context(|| format!("Unknown node {id}"))?;

        let mut hasher = Sha256::new();
        hasher.update(node.class.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(node.node_type.as_bytes());
        hasher.update([0u8]);
        let attributes = self.policy.filter(&node.node_type, &node.attributes);
        hasher.update(canonical_json(&Value::Object(attributes)).as_bytes());

        if node.class == NodeClass::Process {
            let mut inputs: Vec<&Link> = self
                .links
                .iter()
                .filter(|l| l.target == id && l.kind == LinkKind::Input)
                .collect();
            inputs.sort_by(|a, b| a.label.cmp(&b.label));

            for link in inputs {
                let source = self
                    .nodes
                    .get(&link.source)
                    .with_context(|| format!("Unknown input node {}", link.source))?;
                // codes are substituted by mocks in tests
                if source.class == NodeClass::Code {
                    continue;
                }
                hasher.update([0u8]);
                hasher.update(link.label.as_bytes());
                hasher.update([0u8]);
                hasher.update(self.node_hash(link.source)?.as_bytes());
            }
        }

        Ok(hex::encode(hasher.finalize()))
    }

    fn find_equivalent(&self, kind: &ComputationKind, hash: &str, exclude: NodeId) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| {
                n.id != exclude
                    && n.class == NodeClass::Process
                    && n.node_type == kind.name()
                    && n.state == Some(ProcessState::Finished)
                    && n.extras.get(HASH_EXTRA).and_then(Value::as_str) == Some(hash)
            })
            .map(|n| n.id)
    }

    fn clone_outputs(&mut self, source: NodeId, target: NodeId) {
        let outgoing: Vec<Link> = self
            .links
            .iter()
            .filter(|l| l.source == source && matches!(l.kind, LinkKind::Create | LinkKind::Return))
            .cloned()
            .collect();

        for link in outgoing {
            let output = match link.kind {
                LinkKind::Create => {
                    let Some(original) = self.nodes.get(&link.target) else {
                        continue;
                    };
                    let mut copy = original.clone();
                    copy.id = NodeId::new();
                    copy.extras.clear();
                    copy.comments.clear();
                    copy.stored = true;
                    let id = copy.id;
                    self.nodes.insert(id, copy);
                    id
                }
                _ => link.target,
            };
            self.links.push(Link {
                source: target,
                target: output,
                kind: link.kind,
                label: link.label,
            });
        }
    }

    /// Nodes needed to understand `roots`: a process pulls in its inputs,
    /// outputs and called processes, a data node pulls in its creator.
    fn export_closure(&self, roots: &[NodeId]) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            for link in &self.links {
                let next = match (node.class, link.kind) {
                    (NodeClass::Process, LinkKind::Input) if link.target == id => link.source,
                    (NodeClass::Process, LinkKind::Create | LinkKind::Return | LinkKind::Call)
                        if link.source == id =>
                    {
                        link.target
                    }
                    (NodeClass::Data, LinkKind::Create) if link.target == id => link.source,
                    _ => continue,
                };
                queue.push_back(next);
            }
        }

        seen
    }
}

impl EntityHashing for MemoryProvenance {
    fn is_stored(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_stored)
    }

    fn store(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.stored = true;
        Ok(())
    }

    fn content_hash(&self, id: NodeId) -> Result<String> {
        if !self.is_stored(id) {
            bail!("Node {id} is not stored");
        }
        self.node_hash(id)
    }
}

impl ProvenanceStore for MemoryProvenance {
    fn rehash_processes(&mut self) -> Result<usize> {
        let processes: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.class == NodeClass::Process)
            .map(|n| n.id)
            .collect();

        for id in &processes {
            let hash = self.node_hash(*id)?;
            self.set_extra(*id, HASH_EXTRA, json!(hash))?;
        }
        debug!(
            service = services::GRAPH,
            operation = operations::REHASH,
            count = processes.len(),
            "rehashed process nodes"
        );
        Ok(processes.len())
    }

    fn export_archive(&mut self, roots: &[NodeId], path: &Path) -> Result<ExportSummary> {
        for root in roots {
            if !self.is_stored(*root) {
                bail!("Can not export node {root}: not stored");
            }
        }

        let closure = self.export_closure(roots);
        let nodes: Vec<Node> = self
            .nodes
            .values()
            .filter(|n| closure.contains(&n.id))
            .map(|n| {
                let mut node = n.clone();
                node.extras.remove(HASH_EXTRA);
                node
            })
            .collect();
        let links: Vec<Link> = self
            .links
            .iter()
            .filter(|l| closure.contains(&l.source) && closure.contains(&l.target))
            .cloned()
            .collect();

        let data = BundleData { nodes, links };
        let metadata = BundleMetadata::new(roots, &data);
        write_bundle(path, &metadata, &data)?;

        Ok(ExportSummary {
            nodes: data.nodes.len(),
            links: data.links.len(),
        })
    }

    fn import_archive(&mut self, path: &Path, policy: MergePolicy) -> Result<ImportSummary> {
        let (_, data) = read_bundle(path)?;

        let incoming: HashSet<NodeId> = data.nodes.iter().map(|n| n.id).collect();
        let resolves = |id: &NodeId| self.nodes.contains_key(id) || incoming.contains(id);
        if let Some(link) = data
            .links
            .iter()
            .find(|l| !resolves(&l.source) || !resolves(&l.target))
        {
            return Err(CacheError::InvalidArchive {
                path: path.to_path_buf(),
                reason: format!("link {} -> {} has a dangling end", link.source, link.target),
            }
            .into());
        }

        let mut summary = ImportSummary {
            archives: 1,
            ..Default::default()
        };

        for mut node in data.nodes {
            let Some(existing) = self.nodes.get_mut(&node.id) else {
                node.stored = true;
                self.nodes.insert(node.id, node);
                summary.new_nodes += 1;
                continue;
            };

            summary.existing_nodes += 1;
            match policy.extras {
                ExtrasMode::KeepExisting => {}
                ExtrasMode::KeepExistingImportNew => {
                    for (key, value) in node.extras {
                        existing.extras.entry(key).or_insert(value);
                    }
                }
                ExtrasMode::Overwrite => existing.extras.extend(node.extras),
            }
            for comment in node.comments {
                if !existing.comments.contains(&comment) {
                    existing.comments.push(comment);
                }
            }
        }

        let known: HashSet<&Link> = self.links.iter().collect();
        let mut new_links = Vec::new();
        for link in data.links {
            if known.contains(&link) || new_links.contains(&link) {
                continue;
            }
            new_links.push(link);
        }
        summary.new_links = new_links.len();
        self.links.extend(new_links);

        Ok(summary)
    }

    fn caching(&self) -> CachingScope {
        self.caching.clone()
    }

    fn set_caching(&mut self, scope: CachingScope) {
        self.caching = scope;
    }

    fn run(&mut self, kind: &ComputationKind, inputs: &Inputs) -> Result<NodeId> {
        let computation = self
            .computations
            .get(kind)
            .cloned()
            .with_context(|| format!("No computation registered for {kind}"))?;

        let mut attributes = Map::new();
        let mut input_links = Vec::new();
        for (key, leaf) in flatten_inputs(inputs) {
            match leaf {
                InputValue::Scalar(value) => {
                    attributes.insert(key, value.clone());
                }
                InputValue::Entity(id) | InputValue::Executable(id) => {
                    self.store(*id)
                        .with_context(|| format!("Invalid input '{key}' of {kind}"))?;
                    input_links.push((key, *id));
                }
                InputValue::Nested(_) => {}
            }
        }

        let mut node = Node::new(NodeClass::Process, kind.name(), attributes);
        node.stored = true;
        node.state = Some(ProcessState::Running);
        let process = node.id;
        self.nodes.insert(process, node);
        for (label, source) in input_links {
            self.links.push(Link {
                source,
                target: process,
                kind: LinkKind::Input,
                label,
            });
        }

        let hash = self.node_hash(process)?;
        self.set_extra(process, HASH_EXTRA, json!(hash))?;

        if computation.cacheable() && self.caching.allows(kind) {
            if let Some(source) = self.find_equivalent(kind, &hash, process) {
                self.clone_outputs(source, process);
                self.set_extra(process, CACHE_SOURCE_EXTRA, json!(source.to_string()))?;
                self.set_state(process, ProcessState::Finished)?;
                debug!(
                    service = services::GRAPH,
                    operation = operations::RUN,
                    status = status::HIT,
                    kind = %kind,
                    source = %source,
                    "reused equivalent process"
                );
                return Ok(process);
            }
        }

        *self.executions.entry(kind.clone()).or_default() += 1;
        let result = computation.execute(&mut RunContext {
            store: self,
            process,
            inputs,
        });

        match result {
            Ok(()) => {
                self.set_state(process, ProcessState::Finished)?;
                Ok(process)
            }
            Err(e) => {
                self.set_state(process, ProcessState::Excepted)?;
                Err(e.context(format!("{kind} failed")))
            }
        }
    }

    fn result_nodes(&self, kind: Option<&ComputationKind>) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| {
                n.class == NodeClass::Process
                    && n.state == Some(ProcessState::Finished)
                    && kind.is_none_or(|k| n.node_type == k.name())
            })
            .map(|n| n.id)
            .collect()
    }
}

/// What a running computation sees of the store
pub struct RunContext<'a> {
    store: &'a mut MemoryProvenance,
    process: NodeId,
    inputs: &'a Inputs,
}

impl RunContext<'_> {
    pub fn process(&self) -> NodeId {
        self.process
    }

    pub fn inputs(&self) -> &Inputs {
        self.inputs
    }

    /// Input at a dotted path such as `metadata.options.withmpi`
    pub fn input(&self, path: &str) -> Option<&InputValue> {
        let mut parts = path.split('.');
        let mut current = self.inputs.get(parts.next()?)?;
        for part in parts {
            match current {
                InputValue::Nested(children) => current = children.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn entity(&self, path: &str) -> Result<NodeId> {
        match self.input(path) {
            Some(InputValue::Entity(id)) => Ok(*id),
            _ => bail!("Input '{path}' is not an entity"),
        }
    }

    pub fn namespace(&self, path: &str) -> Result<Inputs> {
        match self.input(path) {
            Some(InputValue::Nested(children)) => Ok(children.clone()),
            _ => bail!("Input '{path}' is not a namespace"),
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.store
            .node(id)
            .with_context(|| format!("Unknown node {id}"))
    }

    /// Attribute `key` of the entity bound to input `path`
    pub fn entity_attribute(&self, path: &str, key: &str) -> Result<&Value> {
        let id = self.entity(path)?;
        self.node(id)?
            .attributes
            .get(key)
            .with_context(|| format!("Input '{path}' has no attribute '{key}'"))
    }

    pub fn create_output(&mut self, label: &str, node_type: &str, attributes: Value) -> Result<NodeId> {
        let id = self.store.create_data(node_type, attributes)?;
        self.store.store(id)?;
        self.store.links.push(Link {
            source: self.process,
            target: id,
            kind: LinkKind::Create,
            label: label.to_string(),
        });
        Ok(id)
    }

    /// Run a sub-computation on behalf of this process.
    pub fn call(&mut self, kind: &ComputationKind, inputs: &Inputs) -> Result<NodeId> {
        let child = self.store.run(kind, inputs)?;
        self.store.links.push(Link {
            source: self.process,
            target: child,
            kind: LinkKind::Call,
            label: kind.name().to_string(),
        });
        Ok(child)
    }

    pub fn output_of(&self, process: NodeId, label: &str) -> Option<NodeId> {
        self.store.output(process, label)
    }

    pub fn return_output(&mut self, label: &str, id: NodeId) -> Result<()> {
        if !self.store.is_stored(id) {
            bail!("Can not return unstored node {id}");
        }
        self.store.links.push(Link {
            source: self.process,
            target: id,
            kind: LinkKind::Return,
            label: label.to_string(),
        });
        Ok(())
    }
}
