/// Snapshot archive format
///
/// A snapshot is a gzip-compressed tar holding two JSON documents:
/// `metadata.json` describes the export, `data.json` holds the nodes and the
/// links between them. Archives are written to a temporary file next to the
/// target and persisted once complete.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use tempfile::NamedTempFile;

use super::memory::{Link, Node};
use crate::digest::NodeId;
use crate::error::CacheError;

pub const FORMAT_VERSION: u32 = 1;

const METADATA_ENTRY: &str = "metadata.json";
const DATA_ENTRY: &str = "data.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub roots: Vec<NodeId>,
    pub node_count: usize,
    pub link_count: usize,
}

impl BundleMetadata {
    pub fn new(roots: &[NodeId], data: &BundleData) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            roots: roots.to_vec(),
            node_count: data.nodes.len(),
            link_count: data.links.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleData {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

pub fn write_bundle(path: &Path, metadata: &BundleMetadata, data: &BundleData) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    let mut builder = Builder::new(GzEncoder::new(temp.as_file(), Compression::default()));
    append_entry(
        &mut builder,
        METADATA_ENTRY,
        &serde_json::to_vec_pretty(metadata).context("Failed to serialize metadata")?,
    )?;
    append_entry(
        &mut builder,
        DATA_ENTRY,
        &serde_json::to_vec(data).context("Failed to serialize graph data")?,
    )?;
    builder
        .into_inner()
        .context("Failed to finish tar stream")?
        .finish()
        .context("Failed to finish gzip stream")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write archive: {}", path.display()))?;
    Ok(())
}

fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(bytes.len() as u64);
    builder
        .append_data(&mut header, name, bytes)
        .with_context(|| format!("Failed to append {name}"))
}

pub fn read_bundle(path: &Path) -> Result<(BundleMetadata, BundleData)> {
    let invalid = |reason: String| CacheError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };

    let file =
        File::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut metadata_bytes = None;
    let mut data_bytes = None;
    for entry in archive.entries().map_err(|e| invalid(e.to_string()))? {
        let mut entry = entry.map_err(|e| invalid(e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| invalid(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| invalid(e.to_string()))?;
        match name.as_str() {
            METADATA_ENTRY => metadata_bytes = Some(bytes),
            DATA_ENTRY => data_bytes = Some(bytes),
            _ => {}
        }
    }

    let metadata_bytes = metadata_bytes.ok_or_else(|| invalid(format!("missing {METADATA_ENTRY}")))?;
    let data_bytes = data_bytes.ok_or_else(|| invalid(format!("missing {DATA_ENTRY}")))?;

    let metadata: BundleMetadata = serde_json::from_slice(&metadata_bytes)
        .map_err(|e| invalid(format!("{METADATA_ENTRY}: {e}")))?;
    if metadata.format_version != FORMAT_VERSION {
        return Err(invalid(format!(
            "unsupported format version {}",
            metadata.format_version
        ))
        .into());
    }
    let data: BundleData =
        serde_json::from_slice(&data_bytes).map_err(|e| invalid(format!("{DATA_ENTRY}: {e}")))?;

    Ok((metadata, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::{LinkKind, NodeClass};
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn sample() -> BundleData {
        let file = Node::new(NodeClass::Data, "file", Map::new());
        let mut attributes = Map::new();
        attributes.insert("x".into(), json!(1));
        let calc = Node::new(NodeClass::Process, "DiffCalculation", attributes);
        let link = Link {
            source: file.id,
            target: calc.id,
            kind: LinkKind::Input,
            label: "file1".into(),
        };
        BundleData {
            nodes: vec![file, calc],
            links: vec![link],
        }
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("caches/diffDiffCalculation-nodes-abc.tar.gz");
        let data = sample();
        let metadata = BundleMetadata::new(&[data.nodes[1].id], &data);

        write_bundle(&path, &metadata, &data).unwrap();
        let (read_metadata, read_data) = read_bundle(&path).unwrap();

        assert_eq!(read_metadata, metadata);
        assert_eq!(read_data.nodes.len(), 2);
        assert_eq!(read_data.links, data.links);
        assert_eq!(read_data.nodes[1].attributes["x"], json!(1));
    }

    #[test]
    fn test_not_gzip_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bogus.tar.gz");
        fs::write(&path, "not an archive").unwrap();

        let err = read_bundle(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_missing_entry_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.tar.gz");
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        append_entry(&mut builder, METADATA_ENTRY, b"{}").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = read_bundle(&path).unwrap_err();
        assert!(err.to_string().contains("missing data.json"));
    }
}
