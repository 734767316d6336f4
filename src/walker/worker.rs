//! Per-target host worker
//!
//! One worker owns the whole lifecycle of a single target: deadline
//! timer, name resolution, port probe, session acquisition, share
//! fan-out under the per-host gate, and statistics aggregation.
//!
//! # Deadline enforcement
//!
//! The deadline thread arms before any network I/O. When it fires it
//! sets the shared timeout flag, force-closes every connection in the
//! host's pool, cancels the per-host gate so all waiting share
//! sub-tasks return immediately, and keeps re-force-closing every
//! 500 ms until the worker exits - a sub-task may attempt a fresh
//! connection after the first sweep. Graph content committed before the
//! deadline is kept and the host still counts as processed.

use crate::creds::Credentials;
use crate::graph::{kinds, GraphContext, GraphStore, Node};
use crate::progress::{ScanStats, TraversalCounts};
use crate::rules::{RuleContext, RuleProgram, ShareFact};
use crate::smb::session::ShareInfo;
use crate::smb::{is_port_open, SmbPool};
use crate::targets::{Resolver, Target, TargetKind};
use crate::walker::collector::{collect_share_contents, collect_share_rights};
use crate::walker::gate::Gate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between repeated force-close sweeps after the deadline
const FORCE_CLOSE_SWEEP: Duration = Duration::from_millis(500);

/// Worker configuration shared across all targets
pub struct WorkerOptions {
    pub creds: Arc<Credentials>,
    /// Per-operation network timeout
    pub timeout: Duration,
    /// Whole-host deadline; zero disables it
    pub host_timeout: Duration,
    pub max_workers_per_host: usize,
    /// Maximum traversal depth; zero means unlimited
    pub max_depth: u32,
    /// Explicit nameserver, when configured
    pub nameserver: Option<String>,
}

struct ActiveGuard<'a>(&'a ScanStats);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.host_finished();
    }
}

/// Process one target end to end.
pub fn process_target(
    target: &Target,
    opts: &WorkerOptions,
    rules: &RuleProgram,
    store: &GraphStore,
    stats: &ScanStats,
    resolver: &dyn Resolver,
) {
    stats.host_started();
    let _active = ActiveGuard(stats);

    let started = Instant::now();
    let remote_name = target.value.clone();

    // Pool and timeout flag exist before any network operation so the
    // deadline can tear down whatever is in flight.
    let pool = Arc::new(SmbPool::new(opts.max_workers_per_host));
    let timeout_flag = Arc::new(AtomicBool::new(false));
    let share_gate = Arc::new(Gate::new(opts.max_workers_per_host));

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let deadline_thread = if opts.host_timeout > Duration::ZERO {
        let pool = Arc::clone(&pool);
        let flag = Arc::clone(&timeout_flag);
        let gate = Arc::clone(&share_gate);
        let host = remote_name.clone();
        let host_timeout = opts.host_timeout;

        Some(std::thread::spawn(move || {
            use crossbeam_channel::RecvTimeoutError;
            match done_rx.recv_timeout(host_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }

            flag.store(true, Ordering::SeqCst);
            warn!(target = %host, timeout = ?host_timeout, "Host timeout reached, forcing connection closure");
            pool.force_close_all();
            gate.cancel();

            // New connections may appear after the first sweep; keep
            // closing until the worker signals completion.
            loop {
                match done_rx.recv_timeout(FORCE_CLOSE_SWEEP) {
                    Err(RecvTimeoutError::Timeout) => pool.force_close_all(),
                    _ => return,
                }
            }
        }))
    } else {
        None
    };

    run_target(
        target,
        &remote_name,
        opts,
        rules,
        store,
        stats,
        resolver,
        &pool,
        &share_gate,
        &timeout_flag,
        started,
    );

    drop(done_tx);
    if let Some(handle) = deadline_thread {
        let _ = handle.join();
    }
    pool.close_all();
}

#[allow(clippy::too_many_arguments)]
fn run_target(
    target: &Target,
    remote_name: &str,
    opts: &WorkerOptions,
    rules: &RuleProgram,
    store: &GraphStore,
    stats: &ScanStats,
    resolver: &dyn Resolver,
    pool: &Arc<SmbPool>,
    share_gate: &Gate,
    timeout_flag: &AtomicBool,
    started: Instant,
) {
    // FQDN targets resolve when a nameserver or a domain is configured;
    // otherwise the name goes to the socket layer as-is.
    let mut host = target.value.clone();
    if target.kind == TargetKind::Fqdn
        && (opts.nameserver.is_some() || !opts.creds.domain.is_empty())
    {
        match resolver.resolve(&target.value, opts.timeout) {
            Some(resolved) => host = resolved,
            None => {
                debug!(target = %target.value, "Failed to resolve domain name");
                stats.record_error();
                return;
            }
        }
    }

    if timeout_flag.load(Ordering::SeqCst) {
        return;
    }

    if !is_port_open(&host, 445, opts.timeout) {
        debug!(host = %host, "Port 445 is not open");
        stats.record_error();
        return;
    }

    if timeout_flag.load(Ordering::SeqCst) {
        return;
    }

    // Initial connection discovers the share list
    let session = match pool.acquire(&host, remote_name, &opts.creds, opts.timeout) {
        Ok(s) => s,
        Err(e) => {
            debug!(host = %host, error = %e, "Failed to initialize SMB session");
            stats.record_error();
            return;
        }
    };

    if timeout_flag.load(Ordering::SeqCst) {
        pool.release(&host, session);
        return;
    }

    let shares = match session.list_shares() {
        Ok(s) => s,
        Err(e) => {
            debug!(host = %host, error = %e, "Failed to list shares");
            pool.release(&host, session);
            stats.record_error();
            return;
        }
    };
    pool.release(&host, session);

    debug!(host = %host, count = shares.len(), "Found shares");

    if shares.is_empty() {
        stats.record_success();
        return;
    }

    let totals: Mutex<TraversalCounts> = Mutex::new(TraversalCounts::default());
    let shares_processed = AtomicU64::new(0);
    let shares_skipped = AtomicU64::new(0);

    std::thread::scope(|scope| {
        for info in shares.values() {
            let totals = &totals;
            let shares_processed = &shares_processed;
            let shares_skipped = &shares_skipped;
            let host = host.as_str();

            scope.spawn(move || {
                // Cancellable acquisition: the deadline unblocks every
                // waiter at once.
                let Some(_permit) = share_gate.acquire() else {
                    shares_skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                };

                if timeout_flag.load(Ordering::SeqCst) {
                    shares_skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                match process_share(
                    info,
                    host,
                    remote_name,
                    opts,
                    rules,
                    store,
                    pool,
                    timeout_flag,
                ) {
                    Some(counts) => {
                        shares_processed.fetch_add(1, Ordering::Relaxed);
                        totals.lock().add(counts);
                    }
                    None => {
                        shares_skipped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let counts = *totals.lock();
    counts.merge_into(stats);

    let processed = shares_processed.load(Ordering::Relaxed);
    let skipped = shares_skipped.load(Ordering::Relaxed);
    stats.shares_total.fetch_add(processed + skipped, Ordering::Relaxed);
    stats.shares_processed.fetch_add(processed, Ordering::Relaxed);
    stats.shares_skipped.fetch_add(skipped, Ordering::Relaxed);

    // Partial results after a timeout still count the host as processed
    // so the scan keeps moving.
    stats.record_success();

    info!(
        target = %target.value,
        shares = processed,
        files = counts.files_total,
        dirs = counts.dirs_total,
        elapsed = ?started.elapsed(),
        "Target completed"
    );
}

/// Process a single share. `None` means the share was skipped (rules,
/// timeout, or connection failure) rather than walked.
#[allow(clippy::too_many_arguments)]
fn process_share(
    info: &ShareInfo,
    host: &str,
    remote_name: &str,
    opts: &WorkerOptions,
    rules: &RuleProgram,
    store: &GraphStore,
    pool: &Arc<SmbPool>,
    timeout_flag: &AtomicBool,
) -> Option<TraversalCounts> {
    if timeout_flag.load(Ordering::SeqCst) {
        return None;
    }

    let share_fact = ShareFact::new(info.name.clone(), info.comment.clone());
    let share_rule_ctx = RuleContext {
        share: Some(share_fact.clone()),
        ..Default::default()
    };

    if !rules.can_explore(&share_rule_ctx) {
        debug!(share = %info.name, "Skipping share");
        return None;
    }

    if timeout_flag.load(Ordering::SeqCst) {
        return None;
    }

    let session = match pool.acquire(host, remote_name, &opts.creds, opts.timeout) {
        Ok(s) => s,
        Err(e) => {
            debug!(share = %info.name, error = %e, "Failed to get connection");
            return None;
        }
    };

    if timeout_flag.load(Ordering::SeqCst) {
        pool.release(host, session);
        return None;
    }

    let mut ctx = GraphContext::new(store);

    let host_node = Node::new(remote_name, &[kinds::NODE_NETWORK_SHARE_HOST])
        .with_property("name", remote_name);
    ctx.set_host(host_node);

    let share_id = format!("\\\\{}\\{}\\", remote_name, info.name);
    let share_node = Node::new(share_id, &[kinds::NODE_NETWORK_SHARE_SMB])
        .with_property("displayName", info.name.as_str())
        .with_property("description", info.comment.as_str())
        .with_property("hidden", share_fact.hidden)
        .with_property(
            "type",
            info.type_flags
                .iter()
                .map(|f| serde_json::Value::from(*f))
                .collect::<Vec<_>>(),
        );
    ctx.set_share(share_node);

    if let Err(e) = session.select_share(&info.name) {
        debug!(share = %info.name, error = %e, "Failed to set share");
        pool.release(host, session);
        return None;
    }

    ctx.set_share_rights(collect_share_rights(&session, &info.name));

    // The share scaffold only lands in the graph if PROCESSING allows
    if rules.can_process(&share_rule_ctx) {
        ctx.flush_path();
    }

    let counts = collect_share_contents(
        &session,
        &mut ctx,
        rules,
        &share_fact,
        remote_name,
        opts.max_depth,
        timeout_flag,
    );

    pool.release(host, session);
    Some(counts)
}
