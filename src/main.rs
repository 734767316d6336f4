//! smb-walker - Fleet-Scale SMB Share Rights Mapper
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use smb_walker::checkpoint::{self, CheckpointManager};
use smb_walker::config::{CliArgs, ScanConfig};
use smb_walker::graph::{kinds, GraphStore};
use smb_walker::progress::{print_header, print_summary, ProgressReporter, ScanStats};
use smb_walker::rules::{self, RuleProgram};
use smb_walker::targets::{self, SystemResolver};
use smb_walker::walker::{Scheduler, WorkerOptions};
use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    // Rules are a pre-run configuration input: any parse error aborts
    let rule_program = load_rules(&config)?;

    let targets = targets::load_targets(&config.targets, config.targets_file.as_deref())
        .context("Failed to load targets")?;
    if targets.is_empty() {
        warn!("No targets to scan");
        return Ok(());
    }

    if config.show_progress {
        print_header(
            targets.len(),
            config.threads,
            &config.output.display().to_string(),
        );
    }

    let store = Arc::new(
        GraphStore::new(kinds::NODE_NETWORK_SHARE_BASE).context("Failed to create graph store")?,
    );
    let stats = Arc::new(ScanStats::default());

    // Checkpoint manager, optionally restoring a prior run
    let checkpoint_mgr = Arc::new(CheckpointManager::new(
        config.checkpoint.clone(),
        config.checkpoint_interval,
    ));
    if config.resume {
        if let Some(path) = checkpoint_mgr.path() {
            if checkpoint::exists(path) {
                info!(path = %path.display(), "Resuming from checkpoint");
                let cp = checkpoint::load(path).context("Failed to load checkpoint")?;
                checkpoint_mgr.restore_into(&cp, &store);
            } else {
                warn!("Checkpoint file not found, starting fresh scan");
            }
        }
    }
    CheckpointManager::start(
        &checkpoint_mgr,
        Arc::clone(&store),
        Arc::clone(&stats),
        targets.len(),
    );

    let scheduler = Scheduler::new(config.threads);

    // First interrupt: stop launching, save a checkpoint, let in-flight
    // workers finish. Second interrupt: force exit.
    let stop_handle = scheduler.stop_handle();
    let cp_for_signal = Arc::clone(&checkpoint_mgr);
    let interrupt_count = Arc::new(AtomicU32::new(0));
    ctrlc::set_handler(move || {
        let count = interrupt_count.fetch_add(1, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nInterrupt received, saving checkpoint and shutting down gracefully...");
            eprintln!("Press Ctrl+C again to force exit immediately.");
            cp_for_signal.trigger_save();
            stop_handle.stop();
        } else {
            eprintln!("\nForced exit!");
            std::process::exit(130);
        }
    })
    .context("Failed to set signal handler")?;

    let opts = WorkerOptions {
        creds: Arc::clone(&config.creds),
        timeout: config.timeout,
        host_timeout: config.host_timeout,
        max_workers_per_host: config.max_workers_per_host,
        max_depth: config.max_depth,
        nameserver: config.nameserver.clone(),
    };
    if opts.host_timeout > std::time::Duration::ZERO {
        info!(timeout = ?opts.host_timeout, "Host timeout enabled");
    }

    let started = Instant::now();
    let resolver = SystemResolver;

    // Live status line driven from the shared stats
    let reporter = if config.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let summary = std::thread::scope(|scope| {
        let updater = reporter.as_ref().map(|r| {
            let stats = Arc::clone(&stats);
            let total = targets.len() as u64;
            let stop = scheduler.stop_handle();
            scope.spawn(move || {
                while !stop.is_stopped() {
                    r.update(&stats, total);
                    std::thread::sleep(std::time::Duration::from_millis(250));
                }
            })
        });

        let summary = scheduler.run(
            &targets,
            &opts,
            &rule_program,
            &store,
            &stats,
            &checkpoint_mgr,
            &resolver,
        );

        // Scan is done; release the updater even without an interrupt
        scheduler.stop_handle().stop();
        if let Some(u) = updater {
            let _ = u.join();
        }
        summary
    });

    if let Some(r) = &reporter {
        r.finish_and_clear();
    }

    info!(elapsed = ?started.elapsed(), "Scan phase completed");

    checkpoint_mgr.stop();

    // Export with an in-place phase/percentage line
    let node_count = store.node_count();
    let edge_count = store.edge_count();
    println!(
        "[*] Exporting graph to \"{}\" ({} nodes, {} edges)...",
        config.output.display(),
        node_count,
        edge_count
    );

    let export_progress = |phase: &str, current: u64, total: u64| {
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            eprint!("\r\x1b[K    [{}] {}/{} ({:.1}%)", phase, current, total, pct);
        } else {
            eprint!("\r\x1b[K    [{}]", phase);
        }
        let _ = std::io::stderr().flush();
    };
    store
        .export(&config.output, true, Some(&export_progress))
        .with_context(|| format!("Failed to export graph to {}", config.output.display()))?;
    eprintln!();

    let output_size = std::fs::metadata(&config.output).map(|m| m.len()).ok();
    if config.show_progress {
        print_summary(
            &stats,
            started.elapsed(),
            &config.output.display().to_string(),
            output_size,
        );
    }

    // Completed scans leave no checkpoint behind; interrupted ones keep
    // it with a resume hint
    if checkpoint_mgr.is_enabled() {
        let all_done = checkpoint_mgr.processed_count() >= targets.len();
        let path = checkpoint_mgr.path().map(|p| p.to_path_buf());
        if let Some(path) = path {
            if all_done && summary.unlaunched == 0 {
                if checkpoint::delete(&path).is_ok() {
                    info!("Checkpoint file cleaned up (scan completed)");
                }
            } else {
                println!(
                    "[*] Checkpoint saved to {} (use --resume to continue)",
                    path.display()
                );
            }
        }
    }

    Ok(())
}

/// Parse rule files and strings; defaults apply when neither is given.
fn load_rules(config: &ScanConfig) -> Result<RuleProgram> {
    let mut parsed = Vec::new();

    if config.rules_files.is_empty() && config.rule_strings.is_empty() {
        let (rules, errors) = rules::parse_rule_strings(rules::DEFAULT_RULES);
        debug_assert!(errors.is_empty());
        parsed.extend(rules);
        return Ok(RuleProgram::new(parsed));
    }

    for path in &config.rules_files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading rules file {}", path.display()))?;
        let (rules, errors) = rules::parse_rules(&content);
        if !errors.is_empty() {
            for e in &errors {
                error!(file = %path.display(), "{}", e);
            }
            bail!("errors parsing rules file {}", path.display());
        }
        parsed.extend(rules);
    }

    if !config.rule_strings.is_empty() {
        let (rules, errors) = rules::parse_rule_strings(&config.rule_strings);
        if !errors.is_empty() {
            for e in &errors {
                error!("{}", e);
            }
            bail!("errors parsing rules");
        }
        parsed.extend(rules);
    }

    info!(count = parsed.len(), "Rules parsed");
    Ok(RuleProgram::new(parsed))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("smb_walker=debug,warn")
    } else {
        EnvFilter::new("smb_walker=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
