//! Spill-to-disk graph store
//!
//! Nodes and edges are appended to line-delimited JSON temp files so
//! that memory stays bounded regardless of graph size. Only the set of
//! node id strings (for dedup) and an edge counter are kept in memory.
//!
//! # Performance Characteristics
//!
//! - 256 KiB write buffers on both spill files
//! - A single mutex guards all mutations; it is held across buffered
//!   writes but never across file scans or export streaming
//! - Export streams one JSON value at a time from the spill files

use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, Node};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Spill file write buffer size
const SPILL_BUF_SIZE: usize = 256 * 1024;

/// Export output buffer size
const EXPORT_BUF_SIZE: usize = 64 * 1024;

/// Progress callback: `(phase, current, total)`. Phases with no
/// meaningful counts report `(0, 0)`.
pub type ProgressFn<'a> = &'a (dyn Fn(&str, u64, u64) + Send + Sync);

struct StoreInner {
    node_ids: HashSet<String>,
    edge_count: u64,
    node_tmp: NamedTempFile,
    edge_tmp: NamedTempFile,
    node_buf: BufWriter<File>,
    edge_buf: BufWriter<File>,
}

impl StoreInner {
    fn append_json<T: serde::Serialize>(buf: &mut BufWriter<File>, value: &T) {
        // Best-effort, like every other spill write: an unwritable spill
        // file will surface at flush/export time.
        if let Ok(line) = serde_json::to_string(value) {
            let _ = buf.write_all(line.as_bytes());
            let _ = buf.write_all(b"\n");
        }
    }

    fn flush(&mut self) {
        let _ = self.node_buf.flush();
        let _ = self.edge_buf.flush();
    }
}

/// Deduplicating, disk-backed graph store
pub struct GraphStore {
    source_kind: String,
    inner: Mutex<StoreInner>,
}

impl GraphStore {
    /// Create a new store with empty spill files.
    ///
    /// Temp files are removed when the store is dropped.
    pub fn new(source_kind: impl Into<String>) -> GraphResult<Self> {
        let node_tmp = tempfile::Builder::new()
            .prefix("smb-walker-nodes-")
            .suffix(".ndjson")
            .tempfile()
            .map_err(|e| GraphError::SpillCreate(e.to_string()))?;
        let edge_tmp = tempfile::Builder::new()
            .prefix("smb-walker-edges-")
            .suffix(".ndjson")
            .tempfile()
            .map_err(|e| GraphError::SpillCreate(e.to_string()))?;

        let node_buf = BufWriter::with_capacity(
            SPILL_BUF_SIZE,
            node_tmp
                .as_file()
                .try_clone()
                .map_err(|e| GraphError::SpillCreate(e.to_string()))?,
        );
        let edge_buf = BufWriter::with_capacity(
            SPILL_BUF_SIZE,
            edge_tmp
                .as_file()
                .try_clone()
                .map_err(|e| GraphError::SpillCreate(e.to_string()))?,
        );

        Ok(GraphStore {
            source_kind: source_kind.into(),
            inner: Mutex::new(StoreInner {
                node_ids: HashSet::new(),
                edge_count: 0,
                node_tmp,
                edge_tmp,
                node_buf,
                edge_buf,
            }),
        })
    }

    /// The source kind stamped into exported metadata
    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    /// Add a node; ids already present are dropped silently.
    pub fn add_node(&self, node: &Node) {
        let mut inner = self.inner.lock();
        if inner.node_ids.contains(&node.id) {
            return;
        }
        inner.node_ids.insert(node.id.clone());
        StoreInner::append_json(&mut inner.node_buf, node);
    }

    /// Append an edge. No dedup: callers avoid semantic duplicates at
    /// the source.
    pub fn add_edge(&self, edge: &Edge) {
        let mut inner = self.inner.lock();
        StoreInner::append_json(&mut inner.edge_buf, edge);
        inner.edge_count += 1;
    }

    /// Number of unique nodes
    pub fn node_count(&self) -> u64 {
        self.inner.lock().node_ids.len() as u64
    }

    /// Number of edges
    pub fn edge_count(&self) -> u64 {
        self.inner.lock().edge_count
    }

    /// Look up a node by id.
    ///
    /// Linear scan of the node spill file; diagnostic use only.
    pub fn get_node(&self, id: &str) -> Option<Node> {
        let path = {
            let mut inner = self.inner.lock();
            if !inner.node_ids.contains(id) {
                return None;
            }
            let _ = inner.node_buf.flush();
            inner.node_tmp.path().to_path_buf()
        };

        let file = File::open(path).ok()?;
        for line in BufReader::new(file).lines() {
            let line = line.ok()?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Node>(&line) {
                Ok(node) if node.id == id => return Some(node),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    }

    /// Materialize all nodes and edges in memory for checkpointing.
    ///
    /// The returned vectors are ephemeral; serialize and discard them
    /// promptly.
    pub fn snapshot(&self) -> (Vec<Node>, Vec<Edge>) {
        let (node_path, edge_path, node_cap, edge_cap) = {
            let mut inner = self.inner.lock();
            inner.flush();
            (
                inner.node_tmp.path().to_path_buf(),
                inner.edge_tmp.path().to_path_buf(),
                inner.node_ids.len(),
                inner.edge_count as usize,
            )
        };

        let mut nodes = Vec::with_capacity(node_cap);
        if let Ok(file) = File::open(&node_path) {
            for line in BufReader::with_capacity(SPILL_BUF_SIZE, file).lines() {
                let Ok(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Node>(&line) {
                    Ok(node) => nodes.push(node),
                    Err(_) => break,
                }
            }
        }

        let mut edges = Vec::with_capacity(edge_cap);
        if let Ok(file) = File::open(&edge_path) {
            for line in BufReader::with_capacity(SPILL_BUF_SIZE, file).lines() {
                let Ok(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Edge>(&line) {
                    Ok(edge) => edges.push(edge),
                    Err(_) => break,
                }
            }
        }

        (nodes, edges)
    }

    /// Replace the store's contents from a checkpoint.
    pub fn restore(&self, nodes: &[Node], edges: &[Edge]) -> GraphResult<()> {
        let mut inner = self.inner.lock();

        inner.node_ids = HashSet::with_capacity(nodes.len());
        inner.edge_count = 0;

        // Truncate and rewrite both spill files
        let node_file = inner.node_tmp.as_file_mut();
        node_file.set_len(0)?;
        node_file.seek(SeekFrom::Start(0))?;
        inner.node_buf = BufWriter::with_capacity(
            SPILL_BUF_SIZE,
            inner.node_tmp.as_file().try_clone()?,
        );

        let edge_file = inner.edge_tmp.as_file_mut();
        edge_file.set_len(0)?;
        edge_file.seek(SeekFrom::Start(0))?;
        inner.edge_buf = BufWriter::with_capacity(
            SPILL_BUF_SIZE,
            inner.edge_tmp.as_file().try_clone()?,
        );

        for node in nodes {
            inner.node_ids.insert(node.id.clone());
            StoreInner::append_json(&mut inner.node_buf, node);
        }
        for edge in edges {
            StoreInner::append_json(&mut inner.edge_buf, edge);
            inner.edge_count += 1;
        }

        debug!(nodes = nodes.len(), edges = edges.len(), "Store restored from checkpoint");
        Ok(())
    }

    /// Export the graph as a single JSON document.
    ///
    /// A filename ending in `.zip` (case-insensitive) produces a
    /// deflate-compressed archive with one entry named after the file
    /// base with `.json` appended; anything else writes raw JSON.
    pub fn export(
        &self,
        filename: &Path,
        include_metadata: bool,
        progress: Option<ProgressFn<'_>>,
    ) -> GraphResult<()> {
        let (node_path, edge_path, node_count, edge_count) = {
            let mut inner = self.inner.lock();
            inner.flush();
            (
                inner.node_tmp.path().to_path_buf(),
                inner.edge_tmp.path().to_path_buf(),
                inner.node_ids.len() as u64,
                inner.edge_count,
            )
        };

        if let Some(p) = progress {
            p("Creating output file", 0, 0);
        }

        let file = File::create(filename).map_err(|e| GraphError::Export {
            path: filename.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut out = BufWriter::with_capacity(EXPORT_BUF_SIZE, file);

        let is_zip = filename
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        if is_zip {
            if let Some(p) = progress {
                p("Preparing ZIP archive", 0, 0);
            }

            let entry_name = zip_entry_name(filename);
            let mut zip = zip::ZipWriter::new(out);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(entry_name, options)
                .map_err(|e| GraphError::Export {
                    path: filename.to_path_buf(),
                    reason: e.to_string(),
                })?;

            stream_json(
                &mut zip,
                &self.source_kind,
                include_metadata,
                progress,
                &node_path,
                &edge_path,
                node_count,
                edge_count,
            )?;

            if let Some(p) = progress {
                p("Finalizing ZIP archive", 0, 0);
            }
            out = zip.finish().map_err(|e| GraphError::Export {
                path: filename.to_path_buf(),
                reason: e.to_string(),
            })?;
        } else {
            stream_json(
                &mut out,
                &self.source_kind,
                include_metadata,
                progress,
                &node_path,
                &edge_path,
                node_count,
                edge_count,
            )?;
        }

        if let Some(p) = progress {
            p("Flushing to disk", 0, 0);
        }
        out.flush()?;
        Ok(())
    }
}

/// Entry name for zip output: file base with `.zip` stripped and
/// `.json` appended when not already present.
fn zip_entry_name(filename: &Path) -> String {
    let base = filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graph.zip".to_string());

    let lower = base.to_lowercase();
    let stem = if lower.ends_with(".zip") {
        base[..base.len() - 4].to_string()
    } else {
        base
    };

    if stem.to_lowercase().ends_with(".json") {
        stem
    } else {
        format!("{}.json", stem)
    }
}

/// How often to fire the progress callback: ~25 updates over a run.
fn progress_interval(total: u64) -> u64 {
    (total / 25).max(1)
}

/// Write the graph document by streaming nodes and edges from the spill
/// files. At most one decoded JSON value is in memory at a time.
#[allow(clippy::too_many_arguments)]
fn stream_json<W: Write>(
    w: &mut W,
    source_kind: &str,
    include_metadata: bool,
    progress: Option<ProgressFn<'_>>,
    node_path: &PathBuf,
    edge_path: &PathBuf,
    node_count: u64,
    edge_count: u64,
) -> GraphResult<()> {
    w.write_all(b"{\n")?;

    if include_metadata && !source_kind.is_empty() {
        w.write_all(b"  \"metadata\": {\"source_kind\": \"")?;
        w.write_all(source_kind.as_bytes())?;
        w.write_all(b"\"},\n")?;
    }

    w.write_all(b"  \"graph\": {\n")?;

    // ---- nodes ----
    w.write_all(b"    \"nodes\": [\n")?;
    if let Some(p) = progress {
        p("Serializing nodes", 0, node_count);
    }
    let written = stream_array(
        w,
        node_path,
        node_count,
        progress_interval(node_count),
        "Serializing nodes",
        progress,
    )?;
    if written > 0 {
        w.write_all(b"\n")?;
    }
    if let Some(p) = progress {
        p("Serializing nodes", node_count, node_count);
    }
    w.write_all(b"    ],\n")?;

    // ---- edges ----
    w.write_all(b"    \"edges\": [\n")?;
    if let Some(p) = progress {
        p("Serializing edges", 0, edge_count);
    }
    let written = stream_array(
        w,
        edge_path,
        edge_count,
        progress_interval(edge_count),
        "Serializing edges",
        progress,
    )?;
    if written > 0 {
        w.write_all(b"\n")?;
    }
    if let Some(p) = progress {
        p("Serializing edges", edge_count, edge_count);
    }
    w.write_all(b"    ]\n")?;

    w.write_all(b"  }\n")?;
    w.write_all(b"}\n")?;
    Ok(())
}

/// Copy NDJSON lines from `src` into `w` as a JSON array body (without
/// the surrounding brackets), indented to level 6.
fn stream_array<W: Write>(
    w: &mut W,
    src: &PathBuf,
    total: u64,
    report_interval: u64,
    phase: &str,
    progress: Option<ProgressFn<'_>>,
) -> GraphResult<u64> {
    let file = File::open(src)?;
    let reader = BufReader::with_capacity(SPILL_BUF_SIZE, file);

    let mut idx = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        if idx > 0 {
            w.write_all(b",\n")?;
        }
        w.write_all(b"      ")?;
        w.write_all(line.as_bytes())?;

        idx += 1;
        if let Some(p) = progress {
            if report_interval > 0 && idx % report_interval == 0 {
                p(phase, idx, total);
            }
        }
    }

    if idx != total {
        warn!(expected = total, written = idx, "Spill file count mismatch during export");
    }

    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::kinds;
    use serde_json::Value;
    use std::io::Read;
    use tempfile::tempdir;

    fn sample_store() -> GraphStore {
        let store = GraphStore::new("NetworkShareBase").unwrap();
        store.add_node(&Node::new("host1", &[kinds::NODE_NETWORK_SHARE_HOST]));
        store.add_node(&Node::new("\\\\host1\\data\\", &[kinds::NODE_NETWORK_SHARE_SMB]));
        store.add_edge(&Edge::new("host1", "\\\\host1\\data\\", kinds::EDGE_HAS_NETWORK_SHARE));
        store
    }

    #[test]
    fn test_node_dedup() {
        let store = GraphStore::new("src").unwrap();
        let node = Node::new("a", &[kinds::NODE_FILE]);
        store.add_node(&node);
        store.add_node(&node);
        store.add_node(&node);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_edges_not_deduped() {
        let store = GraphStore::new("src").unwrap();
        let edge = Edge::new("a", "b", kinds::EDGE_CONTAINS);
        store.add_edge(&edge);
        store.add_edge(&edge);
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn test_get_node() {
        let store = sample_store();
        let node = store.get_node("host1").unwrap();
        assert_eq!(node.kinds, vec![kinds::NODE_NETWORK_SHARE_HOST]);
        assert!(store.get_node("missing").is_none());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let store = sample_store();
        let (nodes, edges) = store.snapshot();
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);

        let other = GraphStore::new("src").unwrap();
        other.restore(&nodes, &edges).unwrap();
        assert_eq!(other.node_count(), 2);
        assert_eq!(other.edge_count(), 1);

        let (nodes2, edges2) = other.snapshot();
        assert_eq!(nodes2, nodes);
        assert_eq!(edges2, edges);
    }

    #[test]
    fn test_export_raw_json() {
        let store = sample_store();
        let dir = tempdir().unwrap();
        let out = dir.path().join("graph.json");

        store.export(&out, true, None).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["metadata"]["source_kind"], "NetworkShareBase");
        assert_eq!(doc["graph"]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(doc["graph"]["edges"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_export_without_metadata() {
        let store = sample_store();
        let dir = tempdir().unwrap();
        let out = dir.path().join("graph.json");

        store.export(&out, false, None).unwrap();
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert!(doc.get("metadata").is_none());
    }

    #[test]
    fn test_export_zip() {
        let store = sample_store();
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.zip");

        store.export(&out, true, None).unwrap();

        let file = File::open(&out).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "out.json");

        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["graph"]["nodes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_zip_entry_name() {
        assert_eq!(zip_entry_name(Path::new("out.zip")), "out.json");
        assert_eq!(zip_entry_name(Path::new("/tmp/Graph.ZIP")), "Graph.json");
        assert_eq!(zip_entry_name(Path::new("graph.json.zip")), "graph.json");
    }

    #[test]
    fn test_export_progress_phases() {
        use parking_lot::Mutex as PMutex;
        let store = sample_store();
        let dir = tempdir().unwrap();
        let out = dir.path().join("graph.json");

        let phases: PMutex<Vec<String>> = PMutex::new(Vec::new());
        let cb = |phase: &str, _c: u64, _t: u64| {
            phases.lock().push(phase.to_string());
        };
        store.export(&out, true, Some(&cb)).unwrap();

        let seen = phases.lock();
        assert!(seen.contains(&"Creating output file".to_string()));
        assert!(seen.contains(&"Serializing nodes".to_string()));
        assert!(seen.contains(&"Serializing edges".to_string()));
        assert!(seen.contains(&"Flushing to disk".to_string()));
    }

    #[test]
    fn test_export_empty_graph_is_valid_json() {
        let store = GraphStore::new("src").unwrap();
        let dir = tempdir().unwrap();
        let out = dir.path().join("empty.json");
        store.export(&out, true, None).unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc["graph"]["nodes"].as_array().unwrap().len(), 0);
        assert_eq!(doc["graph"]["edges"].as_array().unwrap().len(), 0);
    }
}
