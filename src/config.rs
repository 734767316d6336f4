//! Configuration types for smb-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::creds::Credentials;
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Maximum reasonable thread count
const MAX_THREADS: usize = 2048;

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 8)
        .unwrap_or(64)
}

/// Map SMB share access rights across a fleet of hosts into an
/// OpenGraph artifact
#[derive(Parser, Debug, Clone)]
#[command(
    name = "smb-walker",
    version,
    about = "Maps SMB share and NTFS access rights into an OpenGraph artifact",
    long_about = "Enumerates SMB shares across a fleet of hosts, walks their directory trees,\n\
                  and emits a graph of principals, hosts, shares, directories, files, and the\n\
                  access rights connecting them.",
    after_help = "EXAMPLES:\n    \
        smb-walker --target 10.0.0.0/24 --auth-domain CORP --auth-user alice --auth-password secret\n    \
        smb-walker -f hosts.txt --auth-hashes :8846f7eaee8fb117ad06bdd830b7586c -o graph.zip\n    \
        smb-walker --target srv01 -r rules.txt --depth 3 --host-timeout 5 --checkpoint scan.json"
)]
pub struct CliArgs {
    /// Target IP, FQDN, or IPv4 CIDR (can be repeated)
    #[arg(long = "target", value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Path to a file containing targets, one per line
    #[arg(short = 'f', long, value_name = "FILE")]
    pub targets_file: Option<PathBuf>,

    /// Output file (a .zip extension enables compression)
    #[arg(short = 'o', long, default_value = "opengraph.zip", value_name = "FILE")]
    pub output: PathBuf,

    /// Windows domain to authenticate to
    #[arg(long, default_value = "", value_name = "DOMAIN")]
    pub auth_domain: String,

    /// Username of the account
    #[arg(long, default_value = "", value_name = "USER")]
    pub auth_user: String,

    /// Password of the account
    #[arg(long, default_value = "", value_name = "PASSWORD")]
    pub auth_password: String,

    /// LM:NT hashes for pass-the-hash
    #[arg(long, value_name = "LM:NT")]
    pub auth_hashes: Option<String>,

    /// Kerberos key for authentication
    #[arg(long, default_value = "", value_name = "KEY")]
    pub auth_key: String,

    /// Use Kerberos authentication
    #[arg(short = 'k', long)]
    pub use_kerberos: bool,

    /// KDC host for Kerberos authentication
    #[arg(long, default_value = "", value_name = "HOST")]
    pub kdc_host: String,

    /// Path to a file containing filter rules (can be repeated)
    #[arg(short = 'r', long = "rules-file", value_name = "FILE")]
    pub rules_files: Vec<PathBuf>,

    /// Filter rule string (can be repeated)
    #[arg(long = "rule-string", value_name = "RULE")]
    pub rule_strings: Vec<String>,

    /// Number of concurrent host workers
    #[arg(long, default_value_t = default_threads(), value_name = "NUM")]
    pub threads: usize,

    /// Maximum concurrent share workers per host
    #[arg(long, default_value = "8", value_name = "NUM")]
    pub max_workers_per_host: usize,

    /// Maximum directory depth to traverse (0 = unlimited)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub depth: u32,

    /// Timeout in seconds for network operations
    #[arg(short = 't', long, default_value = "2.5", value_name = "SECS")]
    pub timeout: f64,

    /// Maximum time in minutes per host (0 = no limit)
    #[arg(long, default_value = "0", value_name = "MINS")]
    pub host_timeout: f64,

    /// Nameserver for DNS queries
    #[arg(short = 'n', long, value_name = "HOST")]
    pub nameserver: Option<String>,

    /// Checkpoint file for resumable scans
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Checkpoint save interval in seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub checkpoint_interval: f64,

    /// Resume from an existing checkpoint file
    #[arg(long)]
    pub resume: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub targets: Vec<String>,
    pub targets_file: Option<PathBuf>,
    pub output: PathBuf,
    pub creds: Arc<Credentials>,
    pub rules_files: Vec<PathBuf>,
    pub rule_strings: Vec<String>,
    pub threads: usize,
    pub max_workers_per_host: usize,
    pub max_depth: u32,
    pub timeout: Duration,
    pub host_timeout: Duration,
    pub nameserver: Option<String>,
    pub checkpoint: Option<PathBuf>,
    pub checkpoint_interval: Duration,
    pub resume: bool,
    pub show_progress: bool,
}

impl ScanConfig {
    /// Validate CLI arguments into a runtime configuration.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.targets.is_empty() && args.targets_file.is_none() {
            return Err(ConfigError::NoTargets);
        }

        if !args.auth_password.is_empty() && args.auth_hashes.is_some() {
            return Err(ConfigError::ConflictingAuth);
        }

        if args.threads == 0 || args.threads > MAX_THREADS {
            return Err(ConfigError::InvalidThreadCount {
                count: args.threads,
                max: MAX_THREADS,
            });
        }

        if args.max_workers_per_host == 0 {
            return Err(ConfigError::InvalidWorkersPerHost {
                count: args.max_workers_per_host,
            });
        }

        let creds = Arc::new(Credentials::new(
            &args.auth_domain,
            &args.auth_user,
            &args.auth_password,
            args.auth_hashes.as_deref(),
            args.use_kerberos,
            &args.auth_key,
            &args.kdc_host,
        ));

        Ok(ScanConfig {
            targets: args.targets,
            targets_file: args.targets_file,
            output: args.output,
            creds,
            rules_files: args.rules_files,
            rule_strings: args.rule_strings,
            threads: args.threads,
            max_workers_per_host: args.max_workers_per_host,
            max_depth: args.depth,
            timeout: Duration::from_secs_f64(args.timeout.max(0.1)),
            host_timeout: Duration::from_secs_f64(args.host_timeout.max(0.0) * 60.0),
            nameserver: args.nameserver,
            checkpoint: args.checkpoint,
            checkpoint_interval: Duration::from_secs_f64(args.checkpoint_interval.max(1.0)),
            resume: args.resume,
            show_progress: !args.quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["smb-walker", "--target", "10.0.0.1"])
    }

    #[test]
    fn test_defaults() {
        let config = ScanConfig::from_args(base_args()).unwrap();
        assert_eq!(config.max_workers_per_host, 8);
        assert_eq!(config.max_depth, 0);
        assert_eq!(config.timeout, Duration::from_secs_f64(2.5));
        assert_eq!(config.host_timeout, Duration::ZERO);
        assert_eq!(config.checkpoint_interval, Duration::from_secs(60));
        assert!(config.show_progress);
        assert_eq!(config.output, PathBuf::from("opengraph.zip"));
    }

    #[test]
    fn test_no_targets_rejected() {
        let args = CliArgs::parse_from(["smb-walker"]);
        assert!(matches!(
            ScanConfig::from_args(args),
            Err(ConfigError::NoTargets)
        ));
    }

    #[test]
    fn test_conflicting_auth_rejected() {
        let args = CliArgs::parse_from([
            "smb-walker",
            "--target",
            "10.0.0.1",
            "--auth-password",
            "x",
            "--auth-hashes",
            ":8846f7eaee8fb117ad06bdd830b7586c",
        ]);
        assert!(matches!(
            ScanConfig::from_args(args),
            Err(ConfigError::ConflictingAuth)
        ));
    }

    #[test]
    fn test_invalid_worker_counts() {
        let mut args = base_args();
        args.threads = 0;
        assert!(ScanConfig::from_args(args).is_err());

        let mut args = base_args();
        args.max_workers_per_host = 0;
        assert!(ScanConfig::from_args(args).is_err());
    }

    #[test]
    fn test_host_timeout_minutes() {
        let mut args = base_args();
        args.host_timeout = 5.0;
        let config = ScanConfig::from_args(args).unwrap();
        assert_eq!(config.host_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_hashes_parsed_into_creds() {
        let args = CliArgs::parse_from([
            "smb-walker",
            "--target",
            "10.0.0.1",
            "--auth-user",
            "alice",
            "--auth-hashes",
            ":8846f7eaee8fb117ad06bdd830b7586c",
        ]);
        let config = ScanConfig::from_args(args).unwrap();
        assert!(config.creds.can_pass_the_hash());
    }
}
