//! Checkpoint/resume support
//!
//! A checkpoint is one JSON file holding the processed-target set, the
//! full graph contents, and the headline statistics. Saves are atomic
//! (write to `<path>.tmp`, rename over `<path>`). A background thread
//! saves on a fixed interval, on explicit trigger (one coalescing
//! pending slot), and once more on shutdown.

use crate::error::CheckpointError;
use crate::graph::{Edge, GraphStore, Node};
use crate::progress::ScanStats;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Checkpoint schema version
pub const CHECKPOINT_VERSION: &str = "1.0.0";

/// Statistics snapshot embedded in a checkpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointStats {
    pub success: u64,
    pub errors: u64,
    pub shares_total: u64,
    pub shares_processed: u64,
    pub files_total: u64,
    pub files_processed: u64,
    pub directories_total: u64,
    pub directories_processed: u64,
}

impl CheckpointStats {
    pub fn from_stats(stats: &ScanStats) -> Self {
        CheckpointStats {
            success: stats.success.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
            shares_total: stats.shares_total.load(Ordering::Relaxed),
            shares_processed: stats.shares_processed.load(Ordering::Relaxed),
            files_total: stats.files_total.load(Ordering::Relaxed),
            files_processed: stats.files_processed.load(Ordering::Relaxed),
            directories_total: stats.dirs_total.load(Ordering::Relaxed),
            directories_processed: stats.dirs_processed.load(Ordering::Relaxed),
        }
    }
}

/// A saved scan state
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub processed_targets: HashMap<String, bool>,
    pub total_targets: usize,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub statistics: CheckpointStats,
}

/// Load a checkpoint from disk.
pub fn load(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| CheckpointError::Parse(e.to_string()))
}

/// True if a checkpoint file exists at the path.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Remove the checkpoint file; absent files are a no-op.
pub fn delete(path: &Path) -> Result<(), CheckpointError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CheckpointError::Io(e)),
    }
}

enum ControlMsg {
    Save,
    Stop,
}

/// Manages the processed-target set and background saving.
pub struct CheckpointManager {
    path: Option<PathBuf>,
    interval: Duration,
    processed: RwLock<HashSet<String>>,
    control: Mutex<Option<(Sender<ControlMsg>, JoinHandle<()>)>>,
}

impl CheckpointManager {
    /// An empty path disables checkpointing entirely.
    pub fn new(path: Option<PathBuf>, interval: Duration) -> Self {
        CheckpointManager {
            path,
            interval,
            processed: RwLock::new(HashSet::new()),
            control: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mark a target value as processed.
    pub fn mark_processed(&self, target_value: &str) {
        if !self.is_enabled() {
            return;
        }
        self.processed.write().insert(target_value.to_string());
    }

    /// True if the target was processed in this run or a restored one.
    pub fn is_processed(&self, target_value: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.processed.read().contains(target_value)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.read().len()
    }

    /// Replace the processed set and the store contents from a loaded
    /// checkpoint.
    pub fn restore_into(&self, checkpoint: &Checkpoint, store: &GraphStore) {
        {
            let mut processed = self.processed.write();
            processed.clear();
            for (target, done) in &checkpoint.processed_targets {
                if *done {
                    processed.insert(target.clone());
                }
            }
        }
        if let Err(e) = store.restore(&checkpoint.nodes, &checkpoint.edges) {
            error!(error = %e, "Failed to restore graph from checkpoint");
        }
        info!(
            targets = self.processed_count(),
            nodes = checkpoint.nodes.len(),
            edges = checkpoint.edges.len(),
            "Checkpoint restored"
        );
    }

    /// Start the background saver.
    pub fn start(
        manager: &Arc<Self>,
        store: Arc<GraphStore>,
        stats: Arc<ScanStats>,
        total_targets: usize,
    ) {
        if !manager.is_enabled() || manager.interval.is_zero() {
            return;
        }

        // One pending slot: triggers while a save is pending coalesce
        let (tx, rx): (Sender<ControlMsg>, Receiver<ControlMsg>) = bounded(1);
        let manager_bg = Arc::clone(manager);

        let handle = std::thread::Builder::new()
            .name("checkpoint".into())
            .spawn(move || {
                let ticker = tick(manager_bg.interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            manager_bg.save(&store, &stats, total_targets);
                        }
                        recv(rx) -> msg => match msg {
                            Ok(ControlMsg::Save) => manager_bg.save(&store, &stats, total_targets),
                            Ok(ControlMsg::Stop) | Err(_) => {
                                // Final save before exiting
                                manager_bg.save(&store, &stats, total_targets);
                                return;
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn checkpoint thread");

        *manager.control.lock() = Some((tx, handle));
    }

    /// Request an immediate save; a no-op when one is already pending.
    pub fn trigger_save(&self) {
        if let Some((tx, _)) = self.control.lock().as_ref() {
            let _ = tx.try_send(ControlMsg::Save);
        }
    }

    /// Stop the background saver, performing one final save.
    pub fn stop(&self) {
        let Some((tx, handle)) = self.control.lock().take() else {
            return;
        };
        let _ = tx.send(ControlMsg::Stop);
        let _ = handle.join();
    }

    /// Write the checkpoint file atomically.
    fn save(&self, store: &GraphStore, stats: &ScanStats, total_targets: usize) {
        let Some(path) = &self.path else { return };

        let processed: HashMap<String, bool> = self
            .processed
            .read()
            .iter()
            .map(|t| (t.clone(), true))
            .collect();

        debug!(targets = processed.len(), "Checkpoint: copying graph data");
        let (nodes, edges) = store.snapshot();

        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION.to_string(),
            timestamp: Utc::now(),
            processed_targets: processed,
            total_targets,
            nodes,
            edges,
            statistics: CheckpointStats::from_stats(stats),
        };

        let data = match serde_json::to_vec_pretty(&checkpoint) {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "Failed to serialize checkpoint");
                return;
            }
        };

        let tmp = path.with_extension("tmp");
        if let Err(e) = std::fs::write(&tmp, &data) {
            error!(error = %e, path = %tmp.display(), "Failed to write checkpoint");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            error!(error = %e, path = %path.display(), "Failed to replace checkpoint");
            return;
        }

        debug!(
            path = %path.display(),
            nodes = checkpoint.nodes.len(),
            edges = checkpoint.edges.len(),
            "Checkpoint saved"
        );
    }
}
