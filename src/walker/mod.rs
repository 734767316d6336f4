//! Scheduling and traversal
//!
//! - [`gate`] - the cancellable counting gate backing both concurrency
//!   tiers
//! - [`collector`] - rights collection and breadth-first directory
//!   traversal
//! - [`worker`] - per-target lifecycle with deadline enforcement
//! - [`scheduler`] - the two-tier run loop

pub mod collector;
pub mod gate;
pub mod scheduler;
pub mod worker;

pub use gate::Gate;
pub use scheduler::{RunSummary, Scheduler, StopHandle};
pub use worker::{process_target, WorkerOptions};
