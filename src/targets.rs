//! Target descriptors and loading
//!
//! A target is `(kind, value)` where kind is IPv4, IPv6, or FQDN; the
//! pair is the unique key the scheduler and checkpoint operate on.
//! Operators hand in single values, files (one per line, `#` comments),
//! or IPv4 CIDR blocks which expand here. Directory-service discovery
//! is an external collaborator and out of scope.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Target address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Ipv4,
    Ipv6,
    Fqdn,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Ipv4 => "ipv4",
            TargetKind::Ipv6 => "ipv6",
            TargetKind::Fqdn => "fqdn",
        }
    }
}

/// One scan target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    /// Classify a single host value (not a CIDR).
    pub fn from_value(value: &str) -> Target {
        let kind = match value.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => TargetKind::Ipv4,
            Ok(IpAddr::V6(_)) => TargetKind::Ipv6,
            Err(_) => TargetKind::Fqdn,
        };
        Target {
            kind,
            value: value.to_string(),
        }
    }
}

/// True if the string parses as IPv4 CIDR notation.
pub fn is_ipv4_cidr(s: &str) -> bool {
    parse_ipv4_cidr(s).is_some()
}

fn parse_ipv4_cidr(s: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = s.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

/// Expand an IPv4 CIDR block into host addresses.
///
/// Network and broadcast addresses are trimmed for blocks larger than
/// two addresses.
pub fn expand_ipv4_cidr(cidr: &str) -> Option<Vec<String>> {
    let (addr, prefix) = parse_ipv4_cidr(cidr)?;

    let mask: u32 = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    let base = u32::from(addr) & mask;
    let count = 1u64 << (32 - prefix);

    let mut ips = Vec::with_capacity(count.min(1 << 20) as usize);
    for i in 0..count {
        ips.push(Ipv4Addr::from(base.wrapping_add(i as u32)).to_string());
    }

    if ips.len() > 2 {
        ips.remove(ips.len() - 1);
        ips.remove(0);
    }
    Some(ips)
}

/// Expand one operator-supplied entry into targets.
pub fn expand_entry(entry: &str) -> Vec<Target> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Vec::new();
    }

    if is_ipv4_cidr(entry) {
        match expand_ipv4_cidr(entry) {
            Some(ips) => return ips.iter().map(|ip| Target::from_value(ip)).collect(),
            None => {
                warn!(entry = %entry, "Failed to expand CIDR");
                return Vec::new();
            }
        }
    }

    vec![Target::from_value(entry)]
}

/// Load targets from explicit values and an optional file, deduplicated
/// while preserving first-seen order.
pub fn load_targets(
    values: &[String],
    targets_file: Option<&Path>,
) -> Result<Vec<Target>, ConfigError> {
    let mut entries: Vec<String> = values.to_vec();

    if let Some(path) = targets_file {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::TargetsFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(line.to_string());
        }
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for entry in &entries {
        for target in expand_entry(entry) {
            if seen.insert((target.kind, target.value.clone())) {
                targets.push(target);
            }
        }
    }

    debug!(count = targets.len(), "Targets loaded");
    Ok(targets)
}

/// Hostname resolution hook.
///
/// The production resolver is external to the core; workers only need
/// "name to address within a timeout". The default implementation uses
/// the system resolver.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str, timeout: Duration) -> Option<String>;
}

/// System-resolver backed implementation
#[derive(Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, name: &str, _timeout: Duration) -> Option<String> {
        let addrs = format!("{}:445", name).to_socket_addrs().ok()?;

        let mut first = None;
        for addr in addrs {
            if addr.is_ipv4() {
                return Some(addr.ip().to_string());
            }
            first.get_or_insert(addr.ip().to_string());
        }
        first
    }
}
