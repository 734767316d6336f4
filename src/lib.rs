//! smb-walker - Fleet-Scale SMB Share Rights Mapper
//!
//! Enumerates SMB file shares across a fleet of hosts and produces an
//! OpenGraph-style artifact of principals, hosts, shares, directories,
//! files, and the access rights connecting them, for consumption by an
//! external attack-path analysis tool.
//!
//! # Features
//!
//! - **Hand-rolled SMB2 client**: direct TCP to port 445, NTLMv2
//!   authentication (password or pass-the-hash), tree operations, and
//!   security-info queries with no kernel CIFS dependency.
//!
//! - **Two-tier concurrency**: a global gate over host workers and a
//!   per-host gate over share sub-tasks, with per-host deadlines that
//!   forcibly cancel stuck I/O.
//!
//! - **Bounded memory**: nodes and edges spill to disk as they are
//!   discovered; only the node-id set stays resident. The final
//!   document streams out raw or zip-compressed.
//!
//! - **Filter rules**: a small ALLOW/DENY rule language evaluated
//!   against every share, directory, and file.
//!
//! - **Checkpoint/resume**: periodic atomic snapshots of progress and
//!   graph contents survive interruption.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Target Fleet                              │
//! │               (SMB servers, TCP port 445)                        │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//!                                │ SMB2 / DCE-RPC (srvsvc)
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Host Workers                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │ Host 1  │  │ Host 2  │  │ Host 3  │  ...    │ Host N  │      │
//! │  │ pool +  │  │ pool +  │  │ pool +  │         │ pool +  │      │
//! │  │ deadline│  │ deadline│  │ deadline│         │ deadline│      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       │  share sub-tasks (per-host gate)            │           │
//! │       └────────────┬────────────┬───────────────────┘           │
//! │                    ▼            ▼                               │
//! │            ┌──────────────────────────┐                         │
//! │            │     Graph Store          │                         │
//! │            │  (dedup + NDJSON spill)  │                         │
//! │            └──────────────────────────┘                         │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │  streamed export
//!                                ▼
//!                     ┌──────────────────┐
//!                     │  graph.json/.zip │
//!                     └──────────────────┘
//! ```

pub mod checkpoint;
pub mod config;
pub mod creds;
pub mod error;
pub mod graph;
pub mod progress;
pub mod rules;
pub mod smb;
pub mod targets;
pub mod walker;

pub use config::{CliArgs, ScanConfig};
pub use error::{Result, WalkerError};
pub use walker::{RunSummary, Scheduler};
