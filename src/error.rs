//! Error types for smb-walker
//!
//! This module defines a layered error hierarchy that covers:
//! - SMB transport, authentication, and protocol errors
//! - Binary parsing errors (SIDs, ACLs, security descriptors)
//! - Graph store and export errors
//! - Configuration, rule, and checkpoint errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the host/share/path they
//!   relate to where it is cheap to do so
//! - Worker-level code converts errors into statistics bumps, never panics

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the smb-walker application
#[derive(Error, Debug)]
pub enum WalkerError {
    /// SMB-related errors
    #[error("SMB error: {0}")]
    Smb(#[from] SmbError),

    /// Graph store errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule parsing errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Checkpoint errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// SMB connection, authentication, and protocol errors
#[derive(Error, Debug, Clone)]
pub enum SmbError {
    /// TCP connection to port 445 failed
    #[error("Failed to connect to '{host}': {reason}")]
    ConnectionFailed { host: String, reason: String },

    /// Authentication was rejected by the peer
    #[error("Authentication failed on '{host}': {reason}")]
    AuthFailed { host: String, reason: String },

    /// Operation attempted on a session that is not connected
    #[error("Not connected to SMB server")]
    NotConnected,

    /// Tree operation attempted before a share was selected
    #[error("Share not set")]
    ShareNotSet,

    /// Tree connect to a share failed
    #[error("Failed to access share '{share}': {reason}")]
    TreeConnectFailed { share: String, reason: String },

    /// The peer returned a non-success NT status
    #[error("{command} failed with status 0x{status:08x}")]
    Status { command: &'static str, status: u32 },

    /// Malformed or unexpected wire data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Named-pipe RPC failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A binary structure was shorter than its fixed-size header requires
    #[error("{what} too short: need {needed} bytes, got {got}")]
    ShortInput {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    /// Socket I/O failure (includes forceful closure)
    #[error("I/O failure on '{host}': {reason}")]
    Io { host: String, reason: String },

    /// The per-host timeout flag was observed mid-operation
    #[error("Operation cancelled")]
    Cancelled,
}

/// Graph store errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Failed to create a spill file
    #[error("Failed to create spill file: {0}")]
    SpillCreate(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Export output error
    #[error("Failed to export graph to '{path}': {reason}")]
    Export { path: PathBuf, reason: String },

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid thread count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidThreadCount { count: usize, max: usize },

    /// Invalid per-host worker count
    #[error("Invalid per-host worker count {count}: must be at least 1")]
    InvalidWorkersPerHost { count: usize },

    /// Conflicting authentication material
    #[error("Options --auth-password and --auth-hashes are mutually exclusive")]
    ConflictingAuth,

    /// No targets were provided
    #[error("No targets specified: provide --target or --targets-file")]
    NoTargets,

    /// Targets file could not be read
    #[error("Cannot read targets file '{path}': {reason}")]
    TargetsFile { path: PathBuf, reason: String },

    /// Rules file could not be read
    #[error("Cannot read rules file '{path}': {reason}")]
    RulesFile { path: PathBuf, reason: String },

    /// Invalid target descriptor
    #[error("Invalid target '{value}': {reason}")]
    InvalidTarget { value: String, reason: String },
}

/// Rule language errors
///
/// Parse errors carry the 1-based line number of the offending rule.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Checkpoint errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint file is not valid JSON or has the wrong shape
    #[error("Failed to parse checkpoint file: {0}")]
    Parse(String),

    /// Checkpoint file could not be read or written
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category used for retry decisions and statistics
///
/// Mirrors the four buckets the scan loop cares about: only `Protocol`
/// and `Unknown` are worth retrying against the same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Protocol,
    Auth,
    Network,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Protocol => "PROTOCOL",
            ErrorCategory::Auth => "AUTH",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

/// Result of classifying an SMB error
#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub message: String,
    pub should_retry: bool,
}

/// NT status codes that map directly to a category
mod status {
    pub const NOT_SUPPORTED: u32 = 0xc00000bb;
    pub const ACCESS_DENIED: u32 = 0xc0000022;
    pub const LOGON_FAILURE: u32 = 0xc000006d;
    pub const ACCOUNT_DISABLED: u32 = 0xc0000072;
    pub const ACCOUNT_LOCKED_OUT: u32 = 0xc0000234;
    pub const PASSWORD_EXPIRED: u32 = 0xc0000071;
    pub const BAD_NETWORK_NAME: u32 = 0xc00000cc;
    pub const CONNECTION_REFUSED: u32 = 0xc0000236;
    pub const NETWORK_UNREACHABLE: u32 = 0xc000023c;
    pub const HOST_UNREACHABLE: u32 = 0xc000023d;
}

/// Classify an SMB error for retry handling and statistics.
///
/// Status codes are matched first; everything else falls back to
/// pattern-matching the error text, the same way the scan loop's peers
/// report failures in practice.
pub fn classify_smb_error(err: &SmbError) -> ErrorClassification {
    if let SmbError::Status { status, .. } = err {
        match *status {
            status::NOT_SUPPORTED => {
                return ErrorClassification {
                    category: ErrorCategory::Protocol,
                    message: "SMB dialect or feature not supported by server".into(),
                    should_retry: true,
                }
            }
            status::LOGON_FAILURE => {
                return ErrorClassification {
                    category: ErrorCategory::Auth,
                    message: "Invalid username or password".into(),
                    should_retry: false,
                }
            }
            status::ACCESS_DENIED => {
                return ErrorClassification {
                    category: ErrorCategory::Auth,
                    message: "Access denied - insufficient privileges".into(),
                    should_retry: false,
                }
            }
            status::ACCOUNT_DISABLED => {
                return ErrorClassification {
                    category: ErrorCategory::Auth,
                    message: "Account is disabled".into(),
                    should_retry: false,
                }
            }
            status::ACCOUNT_LOCKED_OUT => {
                return ErrorClassification {
                    category: ErrorCategory::Auth,
                    message: "Account is locked out".into(),
                    should_retry: false,
                }
            }
            status::PASSWORD_EXPIRED => {
                return ErrorClassification {
                    category: ErrorCategory::Auth,
                    message: "Password has expired".into(),
                    should_retry: false,
                }
            }
            status::BAD_NETWORK_NAME => {
                return ErrorClassification {
                    category: ErrorCategory::Network,
                    message: "Share or network name not found".into(),
                    should_retry: false,
                }
            }
            status::CONNECTION_REFUSED
            | status::NETWORK_UNREACHABLE
            | status::HOST_UNREACHABLE => {
                return ErrorClassification {
                    category: ErrorCategory::Network,
                    message: "Network connectivity issue".into(),
                    should_retry: false,
                }
            }
            _ => {}
        }
    }

    let text = err.to_string().to_lowercase();

    if text.contains("not supported") || text.contains("dialect") || text.contains("unsupported") {
        return ErrorClassification {
            category: ErrorCategory::Protocol,
            message: "SMB dialect or feature not supported by server".into(),
            should_retry: true,
        };
    }

    if text.contains("logon failure")
        || text.contains("invalid username")
        || text.contains("invalid password")
        || text.contains("authentication")
    {
        return ErrorClassification {
            category: ErrorCategory::Auth,
            message: "Invalid username or password".into(),
            should_retry: false,
        };
    }

    if text.contains("access denied") {
        return ErrorClassification {
            category: ErrorCategory::Auth,
            message: "Access denied - insufficient privileges".into(),
            should_retry: false,
        };
    }

    if text.contains("network")
        || text.contains("connection refused")
        || text.contains("unreachable")
        || text.contains("timeout")
        || text.contains("timed out")
        || text.contains("connect")
    {
        return ErrorClassification {
            category: ErrorCategory::Network,
            message: "Network connectivity issue".into(),
            should_retry: false,
        };
    }

    if text.contains("bad network name") || text.contains("share not found") {
        return ErrorClassification {
            category: ErrorCategory::Network,
            message: "Share or network name not found".into(),
            should_retry: false,
        };
    }

    ErrorClassification {
        category: ErrorCategory::Unknown,
        message: err.to_string(),
        should_retry: true,
    }
}

impl SmbError {
    /// Check if this error is worth retrying against the same peer
    pub fn should_retry(&self) -> bool {
        classify_smb_error(self).should_retry
    }
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for SmbError
pub type SmbResult<T> = std::result::Result<T, SmbError>;

/// Result type alias for GraphError
pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = SmbError::Status {
            command: "SESSION_SETUP",
            status: 0xc000006d,
        };
        let c = classify_smb_error(&err);
        assert_eq!(c.category, ErrorCategory::Auth);
        assert!(!c.should_retry);

        let err = SmbError::Status {
            command: "NEGOTIATE",
            status: 0xc00000bb,
        };
        let c = classify_smb_error(&err);
        assert_eq!(c.category, ErrorCategory::Protocol);
        assert!(c.should_retry);
    }

    #[test]
    fn test_text_classification() {
        let err = SmbError::ConnectionFailed {
            host: "10.0.0.1".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(classify_smb_error(&err).category, ErrorCategory::Network);

        let err = SmbError::Protocol("something odd happened".into());
        let c = classify_smb_error(&err);
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert!(c.should_retry);
    }

    #[test]
    fn test_error_conversion() {
        let smb_err = SmbError::NotConnected;
        let walker_err: WalkerError = smb_err.into();
        assert!(matches!(walker_err, WalkerError::Smb(_)));
    }
}
