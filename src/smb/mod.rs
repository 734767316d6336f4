//! SMB client, binary parsers, and connection pooling
//!
//! The layers, bottom up:
//!
//! - [`transport`] - framed direct-TCP stream with lock-free forceful
//!   closure
//! - [`wire`] - SMB2 request builders and response parsers
//! - [`ntlm`] - NTLMSSP authentication and NTLMv2 computation
//! - [`session`] - the per-host session state machine and operations
//! - [`srvsvc`] - the two hand-rolled share-service RPC calls
//! - [`sid`], [`descriptor`], [`access_mask`], [`share_type`] - binary
//!   codecs for security identifiers, self-relative descriptors, and
//!   the mask-to-edge-kind tables
//! - [`pool`] - per-host session reuse with forceful teardown

pub mod access_mask;
pub mod descriptor;
pub mod ntlm;
pub mod pool;
pub mod session;
pub mod share_type;
pub mod sid;
pub mod srvsvc;
pub mod transport;
pub mod wire;

pub use access_mask::{ntfs_rights_for_mask, share_rights_for_mask};
pub use descriptor::{Ace, Acl, SecurityDescriptor};
pub use pool::SmbPool;
pub use session::{FileInfo, ShareInfo, SmbSession};
pub use sid::Sid;
pub use transport::is_port_open;
