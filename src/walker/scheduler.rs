//! Two-tier scan scheduler
//!
//! Tier 1 caps concurrent host workers with a counting gate; tier 2
//! (inside each worker) caps concurrent share sub-tasks per host. The
//! scheduler draws targets in order, skips those already recorded in
//! the checkpoint, and stops launching on the stop signal while letting
//! in-flight workers finish.

use crate::checkpoint::CheckpointManager;
use crate::graph::GraphStore;
use crate::progress::ScanStats;
use crate::rules::RuleProgram;
use crate::targets::{Resolver, Target};
use crate::walker::gate::Gate;
use crate::walker::worker::{process_target, WorkerOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a scheduler run
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Targets launched in this run
    pub launched: u64,
    /// Targets skipped because a prior checkpoint marked them processed
    pub resumed_skips: u64,
    /// Targets never launched because of the stop signal
    pub unlaunched: u64,
}

/// Handle for signalling the scheduler to stop
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    gate: Arc<Gate>,
}

impl StopHandle {
    /// Stop launching new targets. Workers already running finish
    /// normally; a worker blocked waiting for a launch slot is
    /// released immediately.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.gate.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Scheduler over a finite target sequence
pub struct Scheduler {
    gate: Arc<Gate>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    /// `threads` caps simultaneously active host workers.
    pub fn new(threads: usize) -> Self {
        Scheduler {
            gate: Arc::new(Gate::new(threads.max(1))),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            gate: Arc::clone(&self.gate),
        }
    }

    /// Run every target to completion (or until stopped).
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        targets: &[Target],
        opts: &WorkerOptions,
        rules: &RuleProgram,
        store: &GraphStore,
        stats: &ScanStats,
        checkpoint: &CheckpointManager,
        resolver: &dyn Resolver,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        info!(targets = targets.len(), "Scheduler starting");

        std::thread::scope(|scope| {
            for target in targets {
                if self.stop.load(Ordering::SeqCst) {
                    summary.unlaunched += 1;
                    continue;
                }

                if checkpoint.is_processed(&target.value) {
                    summary.resumed_skips += 1;
                    continue;
                }

                // Blocks while all launch slots are busy; the stop
                // signal cancels the gate and unblocks this.
                let Some(permit) = self.gate.acquire() else {
                    summary.unlaunched += 1;
                    continue;
                };

                summary.launched += 1;
                scope.spawn(move || {
                    let _permit = permit;
                    process_target(target, opts, rules, store, stats, resolver);
                    checkpoint.mark_processed(&target.value);
                });
            }
        });

        if summary.resumed_skips > 0 {
            info!(
                skipped = summary.resumed_skips,
                "Skipped already-processed targets from checkpoint"
            );
        }
        debug!(
            launched = summary.launched,
            unlaunched = summary.unlaunched,
            "Scheduler finished"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::Credentials;
    use crate::rules::parse_rule_strings;
    use crate::targets::SystemResolver;
    use std::time::Duration;

    fn options() -> WorkerOptions {
        WorkerOptions {
            creds: Arc::new(Credentials::default()),
            timeout: Duration::from_millis(30),
            host_timeout: Duration::ZERO,
            max_workers_per_host: 2,
            max_depth: 0,
            nameserver: None,
        }
    }

    fn rules() -> RuleProgram {
        let (parsed, errors) = parse_rule_strings(&["DEFAULT: ALLOW"]);
        assert!(errors.is_empty());
        RuleProgram::new(parsed)
    }

    #[test]
    fn test_every_target_is_accounted_for() {
        let store = GraphStore::new("src").unwrap();
        let stats = ScanStats::default();
        let checkpoint = CheckpointManager::new(None, Duration::from_secs(60));

        // Unreachable TEST-NET-1 addresses fail fast at the probe
        let targets: Vec<Target> = (1..=4)
            .map(|i| Target::from_value(&format!("192.0.2.{}", i)))
            .collect();

        let scheduler = Scheduler::new(2);
        let summary = scheduler.run(
            &targets,
            &options(),
            &rules(),
            &store,
            &stats,
            &checkpoint,
            &SystemResolver,
        );

        assert_eq!(summary.launched, 4);
        assert_eq!(stats.hosts_done(), 4);
    }

    #[test]
    fn test_checkpointed_targets_are_skipped() {
        use tempfile::tempdir;

        let store = GraphStore::new("src").unwrap();
        let stats = ScanStats::default();
        let dir = tempdir().unwrap();
        let checkpoint = CheckpointManager::new(
            Some(dir.path().join("c.json")),
            Duration::from_secs(60),
        );
        checkpoint.mark_processed("192.0.2.1");
        checkpoint.mark_processed("192.0.2.2");

        let targets: Vec<Target> = (1..=3)
            .map(|i| Target::from_value(&format!("192.0.2.{}", i)))
            .collect();

        let scheduler = Scheduler::new(2);
        let summary = scheduler.run(
            &targets,
            &options(),
            &rules(),
            &store,
            &stats,
            &checkpoint,
            &SystemResolver,
        );

        assert_eq!(summary.resumed_skips, 2);
        assert_eq!(summary.launched, 1);
        // The launched target is marked processed afterwards
        assert!(checkpoint.is_processed("192.0.2.3"));
    }

    #[test]
    fn test_stop_prevents_further_launches() {
        let store = GraphStore::new("src").unwrap();
        let stats = ScanStats::default();
        let checkpoint = CheckpointManager::new(None, Duration::from_secs(60));

        let targets: Vec<Target> = (1..=8)
            .map(|i| Target::from_value(&format!("192.0.2.{}", i)))
            .collect();

        let scheduler = Scheduler::new(1);
        scheduler.stop_handle().stop();

        let summary = scheduler.run(
            &targets,
            &options(),
            &rules(),
            &store,
            &stats,
            &checkpoint,
            &SystemResolver,
        );

        assert_eq!(summary.launched, 0);
        assert_eq!(summary.unlaunched, 8);
    }
}
