//! SMB session state machine
//!
//! One authenticated channel to one host. The lifecycle is
//! `New -> Connected -> Authenticated -> (tree-connected to the current
//! share) -> Closed`; `Closed` is terminal.
//!
//! # Concurrency contract
//!
//! All public operations are safe to call concurrently on one session.
//! Internal state is guarded by a mutex held only across short critical
//! sections - never across network I/O - so that [`SmbSession::force_close`]
//! can always interrupt a stuck peer. A second mutex serializes
//! request/response exchanges on the single TCP stream; `force_close`
//! never takes it. The tree-bound state is a shared resource: two
//! operations needing different trees contend and re-select.
//!
//! `force_close` uses a try-lock on the state mutex. When another
//! operation holds it (typically blocked in I/O), the TCP socket is
//! shut down directly through a lock-free closer handle; the blocked
//! operation unwinds with an I/O error and later cleanup completes.

use crate::creds::Credentials;
use crate::error::{SmbError, SmbResult};
use crate::smb::ntlm;
use crate::smb::share_type::stype_flags;
use crate::smb::srvsvc;
use crate::smb::transport::{Transport, TransportCloser};
use crate::smb::wire::{self, Smb2Header};
use crate::smb::SecurityDescriptor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Output buffer size for directory and security queries
const QUERY_BUFFER_SIZE: u32 = 64 * 1024;

/// Read size for named-pipe responses
const PIPE_READ_SIZE: u32 = 64 * 1024;

/// Information about one share on the peer
#[derive(Debug, Clone)]
pub struct ShareInfo {
    pub name: String,
    pub type_flags: Vec<&'static str>,
    pub raw_type: u32,
    pub comment: String,
}

/// Information about one file or directory
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub created_unix: Option<i64>,
    pub modified_unix: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Connected,
    Authenticated,
    Closed,
}

/// Handle to the bound srvsvc pipe
struct SrvsvcPipe {
    tree_id: u32,
    file_id: [u8; 16],
    call_id: u32,
}

struct SessionState {
    phase: Phase,
    transport: Option<Arc<Transport>>,
    session_id: u64,
    message_id: u64,
    signing_key: Option<[u8; 16]>,
    signing_required: bool,
    /// Currently tree-connected share: (lowercased name, tree id)
    current_tree: Option<(String, u32)>,
    srvsvc: Option<SrvsvcPipe>,
}

/// An authenticated SMB channel to one host
pub struct SmbSession {
    host: String,
    remote_name: String,
    port: u16,
    timeout: Duration,
    creds: Arc<Credentials>,
    state: Mutex<SessionState>,
    /// Serializes request/response exchange on the stream. Held across
    /// I/O by design; force_close never takes it.
    transfer: Mutex<()>,
    /// Lock-free-ish closer: held only for assignment and clone.
    closer: Mutex<Option<TransportCloser>>,
}

impl SmbSession {
    pub fn new(
        host: &str,
        port: u16,
        timeout: Duration,
        creds: Arc<Credentials>,
        remote_name: &str,
    ) -> Self {
        let remote_name = if remote_name.is_empty() {
            host
        } else {
            remote_name
        };

        SmbSession {
            host: host.to_string(),
            remote_name: remote_name.to_string(),
            port,
            timeout,
            creds,
            state: Mutex::new(SessionState {
                phase: Phase::New,
                transport: None,
                session_id: 0,
                message_id: 0,
                signing_key: None,
                signing_required: false,
                current_tree: None,
                srvsvc: None,
            }),
            transfer: Mutex::new(()),
            closer: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.phase == Phase::Authenticated && state.transport.is_some()
    }

    /// Establish the channel: TCP connect, negotiate, authenticate.
    pub fn connect(&self) -> SmbResult<()> {
        debug!(host = %self.host, "Connecting to SMB server");

        {
            let state = self.state.lock();
            if state.phase == Phase::Closed {
                return Err(SmbError::NotConnected);
            }
        }

        let transport = Arc::new(Transport::connect(&self.host, self.port, self.timeout)?);
        *self.closer.lock() = Some(transport.closer());

        {
            let mut state = self.state.lock();
            if state.phase == Phase::Closed {
                transport.close();
                return Err(SmbError::NotConnected);
            }
            state.transport = Some(Arc::clone(&transport));
            state.phase = Phase::Connected;
            state.message_id = 0;
        }

        // NEGOTIATE
        let client_guid: [u8; 16] = rand::random();
        let (hdr, body) =
            self.exchange(wire::SMB2_NEGOTIATE, 0, &wire::build_negotiate(&client_guid))?;
        expect_status("NEGOTIATE", hdr.status, &[wire::STATUS_SUCCESS])?;
        let negotiate = wire::parse_negotiate(&body)?;
        if negotiate.dialect != wire::DIALECT_0202 {
            return Err(SmbError::Protocol(format!(
                "peer selected unsupported dialect 0x{:04x}",
                negotiate.dialect
            )));
        }

        {
            let mut state = self.state.lock();
            state.signing_required = negotiate.signing_required();
        }

        // SESSION_SETUP round 1: NTLM negotiate inside SPNEGO
        let init_token = ntlm::spnego_wrap_init(&ntlm::build_negotiate_token());
        let (hdr, body) = self.exchange(
            wire::SMB2_SESSION_SETUP,
            0,
            &wire::build_session_setup(&init_token),
        )?;
        if hdr.status != wire::STATUS_MORE_PROCESSING_REQUIRED {
            return Err(SmbError::AuthFailed {
                host: self.host.clone(),
                reason: format!("unexpected SESSION_SETUP status 0x{:08x}", hdr.status),
            });
        }

        {
            let mut state = self.state.lock();
            state.session_id = hdr.session_id;
        }

        // SESSION_SETUP round 2: NTLMv2 authenticate
        let server_token = wire::parse_session_setup(&body)?;
        let challenge = ntlm::parse_challenge_token(&server_token)?;
        let auth = ntlm::build_authenticate_token(&self.creds, &challenge)?;
        let auth_token = ntlm::spnego_wrap_response(&auth.token);

        let (hdr, _) = self.exchange(
            wire::SMB2_SESSION_SETUP,
            0,
            &wire::build_session_setup(&auth_token),
        )?;
        if hdr.status != wire::STATUS_SUCCESS {
            let err = SmbError::Status {
                command: "SESSION_SETUP",
                status: hdr.status,
            };
            debug!(host = %self.host, status = format_args!("0x{:08x}", hdr.status), "Authentication failed");
            return Err(err);
        }

        {
            let mut state = self.state.lock();
            state.phase = Phase::Authenticated;
            if state.signing_required && !self.creds.is_anonymous() {
                state.signing_key = Some(auth.session_key);
            }
        }

        debug!(
            host = %self.host,
            user = %format!("{}\\{}", self.creds.domain, self.creds.username),
            "Authenticated"
        );
        Ok(())
    }

    /// One request/response exchange with the peer.
    ///
    /// The state mutex is taken twice for microseconds (message id
    /// allocation, snapshot); the transfer mutex serializes the stream.
    fn exchange(&self, command: u16, tree_id: u32, body: &[u8]) -> SmbResult<(Smb2Header, Vec<u8>)> {
        let _io = self.transfer.lock();

        let (transport, session_id, signing_key, message_id) = {
            let mut state = self.state.lock();
            let Some(transport) = state.transport.as_ref().map(Arc::clone) else {
                return Err(SmbError::NotConnected);
            };
            let message_id = state.message_id;
            state.message_id += 1;
            (transport, state.session_id, state.signing_key, message_id)
        };

        let mut header = Smb2Header::request(command, message_id, tree_id, session_id);
        let sign = signing_key.is_some() && command != wire::SMB2_NEGOTIATE;
        if sign {
            header.flags |= wire::SMB2_FLAGS_SIGNED;
        }

        let mut message = Vec::with_capacity(Smb2Header::SIZE + body.len());
        message.extend_from_slice(&header.encode());
        message.extend_from_slice(body);
        if let (true, Some(key)) = (sign, &signing_key) {
            wire::sign_message(key, &mut message);
        }

        transport.send(&message)?;

        // Interim STATUS_PENDING responses for our message id are
        // skipped; responses to other ids would indicate a broken
        // exchange and are dropped with a warning.
        loop {
            let frame = transport.recv()?;
            let hdr = Smb2Header::decode(&frame)?;
            if hdr.message_id != message_id {
                warn!(
                    host = %self.host,
                    expected = message_id,
                    got = hdr.message_id,
                    "Out-of-order response dropped"
                );
                continue;
            }
            if hdr.status == wire::STATUS_PENDING {
                trace!(host = %self.host, message_id, "Peer reported pending");
                continue;
            }
            return Ok((hdr, frame[Smb2Header::SIZE..].to_vec()));
        }
    }

    /// Tree id of the current share, or an error when none is selected.
    fn current_tree_id(&self) -> SmbResult<u32> {
        let state = self.state.lock();
        match &state.current_tree {
            Some((_, tree_id)) => Ok(*tree_id),
            None => Err(SmbError::ShareNotSet),
        }
    }

    fn tree_connect(&self, share_name: &str) -> SmbResult<u32> {
        let unc = format!("\\\\{}\\{}", self.remote_name, share_name);
        let (hdr, _) = self.exchange(wire::SMB2_TREE_CONNECT, 0, &wire::build_tree_connect(&unc))?;
        if hdr.status != wire::STATUS_SUCCESS {
            return Err(SmbError::TreeConnectFailed {
                share: share_name.to_string(),
                reason: format!("status 0x{:08x}", hdr.status),
            });
        }
        Ok(hdr.tree_id)
    }

    fn tree_disconnect(&self, tree_id: u32) {
        // Best-effort; the peer drops trees with the session anyway
        let _ = self.exchange(
            wire::SMB2_TREE_DISCONNECT,
            tree_id,
            &wire::build_tree_disconnect(),
        );
    }

    /// Mount a share, making it the target of subsequent tree
    /// operations. Re-selecting the already-current share is a no-op.
    pub fn select_share(&self, share_name: &str) -> SmbResult<()> {
        let wanted = share_name.to_lowercase();

        let old = {
            let mut state = self.state.lock();
            if state.phase != Phase::Authenticated {
                return Err(SmbError::NotConnected);
            }
            match state.current_tree.take() {
                Some((name, tree_id)) if name == wanted => {
                    state.current_tree = Some((name, tree_id));
                    return Ok(());
                }
                other => other,
            }
        };

        // Old tree is released and the new one mounted without holding
        // the state lock.
        if let Some((_, old_tree)) = old {
            self.tree_disconnect(old_tree);
        }

        let tree_id = self.tree_connect(share_name)?;

        let mut state = self.state.lock();
        if state.phase != Phase::Authenticated {
            drop(state);
            self.tree_disconnect(tree_id);
            return Err(SmbError::NotConnected);
        }
        state.current_tree = Some((wanted, tree_id));
        Ok(())
    }

    /// Name of the currently selected share, if any
    pub fn current_share(&self) -> Option<String> {
        self.state.lock().current_tree.as_ref().map(|(n, _)| n.clone())
    }

    /// List shares on the peer via the share service.
    pub fn list_shares(&self) -> SmbResult<HashMap<String, ShareInfo>> {
        let shares = self.with_srvsvc(|this, pipe| {
            let stub = srvsvc::build_share_enum_stub(&this.remote_name);
            let request = srvsvc::build_request(pipe.call_id, srvsvc::OP_SHARE_ENUM, &stub);
            let response = this.pipe_transact(pipe.tree_id, &pipe.file_id, &request)?;
            srvsvc::parse_share_enum(srvsvc::response_payload(&response)?)
        })?;

        let mut out = HashMap::with_capacity(shares.len());
        for share in shares {
            out.insert(
                share.name.to_lowercase(),
                ShareInfo {
                    type_flags: stype_flags(share.share_type),
                    raw_type: share.share_type,
                    comment: share.remark,
                    name: share.name,
                },
            );
        }
        debug!(host = %self.host, count = out.len(), "Listed shares");
        Ok(out)
    }

    /// Fetch the share-level security descriptor via the share service.
    ///
    /// Callers fall back to [`Self::get_share_root_descriptor`] on any
    /// failure; both failing means the share is treated as having empty
    /// rights.
    pub fn get_share_security_descriptor(&self, share_name: &str) -> SmbResult<Option<Vec<u8>>> {
        let result = self.with_srvsvc(|this, pipe| {
            let stub = srvsvc::build_share_get_info_stub(&this.remote_name, share_name);
            let request = srvsvc::build_request(pipe.call_id, srvsvc::OP_SHARE_GET_INFO, &stub);
            let response = this.pipe_transact(pipe.tree_id, &pipe.file_id, &request)?;
            srvsvc::extract_security_descriptor(srvsvc::response_payload(&response)?)
        });

        match result {
            Ok(sd) => Ok(Some(sd)),
            Err(e) => {
                debug!(host = %self.host, share = %share_name, error = %e, "Share descriptor unavailable via RPC");
                Err(e)
            }
        }
    }

    /// Fetch the NTFS descriptor of a share's root directory by
    /// mounting the share transiently. The current tree selection is
    /// left untouched.
    pub fn get_share_root_descriptor(&self, share_name: &str) -> SmbResult<Option<Vec<u8>>> {
        let tree_id = self.tree_connect(share_name)?;
        let result = self.query_security_bytes(tree_id, "");
        self.tree_disconnect(tree_id);

        match result {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => {
                debug!(
                    host = %self.host,
                    share = %share_name,
                    bytes = bytes.len(),
                    "Retrieved root security descriptor"
                );
                Ok(Some(bytes))
            }
            Err(e) => Err(e),
        }
    }

    /// Query the NTFS security descriptor of a path on the current
    /// share. Retrieval failures are expected on locked-down trees and
    /// map to `None` rather than an error.
    pub fn get_file_descriptor(&self, path: &str) -> SmbResult<Option<SecurityDescriptor>> {
        let tree_id = self.current_tree_id()?;
        let normalized = normalize_path(path);

        match self.query_security_bytes(tree_id, &normalized) {
            Ok(bytes) if bytes.len() >= 20 => Ok(SecurityDescriptor::parse(&bytes).ok()),
            Ok(_) => Ok(None),
            Err(e) => {
                trace!(host = %self.host, path = %normalized, error = %e, "No security descriptor");
                Ok(None)
            }
        }
    }

    /// List the contents of a directory on the current share.
    pub fn list_contents(&self, dir_path: &str) -> SmbResult<HashMap<String, FileInfo>> {
        let tree_id = self.current_tree_id()?;
        let normalized = normalize_path(dir_path);

        let (hdr, body) = self.exchange(
            wire::SMB2_CREATE,
            tree_id,
            &wire::build_create(
                &normalized,
                wire::FILE_LIST_DIRECTORY | wire::FILE_READ_ATTRIBUTES,
                wire::FILE_DIRECTORY_FILE,
            ),
        )?;
        expect_status("CREATE", hdr.status, &[wire::STATUS_SUCCESS])?;
        let file_id = wire::parse_create(&body)?;

        let mut contents = HashMap::new();
        let mut restart = true;
        loop {
            let (hdr, body) = self.exchange(
                wire::SMB2_QUERY_DIRECTORY,
                tree_id,
                &wire::build_query_directory(&file_id, "*", restart, QUERY_BUFFER_SIZE),
            )?;
            restart = false;

            if hdr.status == wire::STATUS_NO_MORE_FILES {
                break;
            }
            expect_status("QUERY_DIRECTORY", hdr.status, &[wire::STATUS_SUCCESS])?;

            for entry in wire::parse_query_directory(&body)? {
                contents.insert(
                    entry.name.clone(),
                    FileInfo {
                        name: entry.name,
                        is_directory: entry.is_directory,
                        size: entry.size,
                        created_unix: entry.created_unix,
                        modified_unix: entry.modified_unix,
                    },
                );
            }
        }

        self.close_handle(tree_id, &file_id);
        Ok(contents)
    }

    /// Liveness probe.
    pub fn ping(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.exchange(wire::SMB2_ECHO, 0, &wire::build_echo()) {
            Ok((hdr, _)) => hdr.status == wire::STATUS_SUCCESS,
            Err(_) => false,
        }
    }

    /// Graceful close: log off and drop the transport.
    pub fn close(&self) {
        let (transport, tree, srvsvc_pipe) = {
            let mut state = self.state.lock();
            if state.phase == Phase::Closed {
                return;
            }
            (
                state.transport.as_ref().map(Arc::clone),
                state.current_tree.take(),
                state.srvsvc.take(),
            )
        };

        // Best-effort teardown I/O outside the lock
        if transport.is_some() {
            if let Some(pipe) = srvsvc_pipe {
                self.close_handle(pipe.tree_id, &pipe.file_id);
                self.tree_disconnect(pipe.tree_id);
            }
            if let Some((_, tree_id)) = tree {
                self.tree_disconnect(tree_id);
            }
            let _ = self.exchange(wire::SMB2_LOGOFF, 0, &wire::build_logoff());
        }

        let mut state = self.state.lock();
        state.phase = Phase::Closed;
        if let Some(t) = state.transport.take() {
            t.close();
        }
        debug!(host = %self.host, "SMB connection closed");
    }

    /// Immediate close, safe to call concurrently with any other
    /// operation on this session.
    pub fn force_close(&self) {
        if let Some(mut state) = self.state.try_lock() {
            debug!(host = %self.host, "Force-closing session");
            state.phase = Phase::Closed;
            state.current_tree = None;
            state.srvsvc = None;
            if let Some(t) = state.transport.take() {
                drop(state);
                t.closer().force_close();
            }
            return;
        }

        // The state lock is held, most likely by an operation blocked
        // in I/O. Shut the socket down without it; the blocked call
        // unwinds with an error and releases the lock, after which a
        // later force_close or close finishes cleanup.
        let closer = self.closer.lock().clone();
        if let Some(c) = closer {
            debug!(host = %self.host, "Force-closing socket while state lock is held");
            c.force_close();
        }
    }

    // -----------------------------------------------------------------
    // srvsvc plumbing
    // -----------------------------------------------------------------

    /// Run `f` with the bound srvsvc pipe, creating and binding it on
    /// first use. Pipe creation happens without the state lock so a
    /// force-close can interrupt it.
    fn with_srvsvc<T>(
        &self,
        f: impl FnOnce(&Self, &SrvsvcPipe) -> SmbResult<T>,
    ) -> SmbResult<T> {
        let existing = {
            let mut state = self.state.lock();
            if state.phase != Phase::Authenticated {
                return Err(SmbError::NotConnected);
            }
            state.srvsvc.as_mut().map(|p| {
                p.call_id += 1;
                SrvsvcPipe {
                    tree_id: p.tree_id,
                    file_id: p.file_id,
                    call_id: p.call_id,
                }
            })
        };

        if let Some(pipe) = existing {
            return f(self, &pipe);
        }

        let pipe = self.open_srvsvc_pipe()?;

        let pipe = {
            let mut state = self.state.lock();
            if state.phase != Phase::Authenticated {
                drop(state);
                self.close_handle(pipe.tree_id, &pipe.file_id);
                return Err(SmbError::NotConnected);
            }
            if let Some(theirs) = &mut state.srvsvc {
                // Another thread bound the pipe first; use theirs and
                // release ours.
                theirs.call_id += 1;
                let snapshot = SrvsvcPipe {
                    tree_id: theirs.tree_id,
                    file_id: theirs.file_id,
                    call_id: theirs.call_id,
                };
                drop(state);
                self.close_handle(pipe.tree_id, &pipe.file_id);
                snapshot
            } else {
                let snapshot = SrvsvcPipe {
                    tree_id: pipe.tree_id,
                    file_id: pipe.file_id,
                    call_id: pipe.call_id + 1,
                };
                state.srvsvc = Some(SrvsvcPipe {
                    tree_id: pipe.tree_id,
                    file_id: pipe.file_id,
                    call_id: pipe.call_id + 1,
                });
                snapshot
            }
        };

        f(self, &pipe)
    }

    /// Mount IPC$, open the srvsvc pipe, and bind the interface.
    fn open_srvsvc_pipe(&self) -> SmbResult<SrvsvcPipe> {
        let tree_id = self.tree_connect("IPC$")?;

        let (hdr, body) = self.exchange(
            wire::SMB2_CREATE,
            tree_id,
            &wire::build_create(srvsvc::SRVSVC_PIPE, wire::PIPE_ACCESS, 0),
        )?;
        if hdr.status != wire::STATUS_SUCCESS {
            self.tree_disconnect(tree_id);
            return Err(SmbError::Rpc(format!(
                "failed to open srvsvc pipe: status 0x{:08x}",
                hdr.status
            )));
        }
        let file_id = wire::parse_create(&body)?;

        let bind = srvsvc::build_bind(1);
        let response = match self.pipe_transact(tree_id, &file_id, &bind) {
            Ok(r) => r,
            Err(e) => {
                self.close_handle(tree_id, &file_id);
                self.tree_disconnect(tree_id);
                return Err(e);
            }
        };
        if let Err(e) = srvsvc::check_bind_ack(&response) {
            self.close_handle(tree_id, &file_id);
            self.tree_disconnect(tree_id);
            return Err(e);
        }

        debug!(host = %self.host, "Bound to share service");
        Ok(SrvsvcPipe {
            tree_id,
            file_id,
            call_id: 1,
        })
    }

    /// Write a request to the pipe, then read the response.
    fn pipe_transact(
        &self,
        tree_id: u32,
        file_id: &[u8; 16],
        request: &[u8],
    ) -> SmbResult<Vec<u8>> {
        let (hdr, _) = self.exchange(
            wire::SMB2_WRITE,
            tree_id,
            &wire::build_write(file_id, request),
        )?;
        expect_status("WRITE", hdr.status, &[wire::STATUS_SUCCESS])?;

        let (hdr, body) = self.exchange(
            wire::SMB2_READ,
            tree_id,
            &wire::build_read(file_id, PIPE_READ_SIZE),
        )?;
        // BUFFER_OVERFLOW on a pipe means more fragments exist; the
        // first fragment is enough for the calls made here.
        expect_status(
            "READ",
            hdr.status,
            &[wire::STATUS_SUCCESS, wire::STATUS_BUFFER_OVERFLOW],
        )?;
        wire::parse_read(&body)
    }

    /// CREATE + QUERY_INFO(security) + CLOSE for a path on a tree.
    fn query_security_bytes(&self, tree_id: u32, path: &str) -> SmbResult<Vec<u8>> {
        let (hdr, body) = self.exchange(
            wire::SMB2_CREATE,
            tree_id,
            &wire::build_create(path, wire::READ_CONTROL | wire::FILE_READ_ATTRIBUTES, 0),
        )?;
        expect_status("CREATE", hdr.status, &[wire::STATUS_SUCCESS])?;
        let file_id = wire::parse_create(&body)?;

        let result = self.exchange(
            wire::SMB2_QUERY_INFO,
            tree_id,
            &wire::build_query_info_security(&file_id, QUERY_BUFFER_SIZE),
        );
        self.close_handle(tree_id, &file_id);

        let (hdr, body) = result?;
        expect_status(
            "QUERY_INFO",
            hdr.status,
            &[wire::STATUS_SUCCESS, wire::STATUS_BUFFER_OVERFLOW],
        )?;
        wire::parse_query_info(&body)
    }

    fn close_handle(&self, tree_id: u32, file_id: &[u8; 16]) {
        let _ = self.exchange(wire::SMB2_CLOSE, tree_id, &wire::build_close(file_id));
    }
}

fn expect_status(command: &'static str, status: u32, accepted: &[u32]) -> SmbResult<()> {
    if accepted.contains(&status) {
        Ok(())
    } else {
        Err(SmbError::Status { command, status })
    }
}

/// Forward slashes become backslashes; an empty path addresses the
/// share root.
fn normalize_path(path: &str) -> String {
    let normalized = path.replace('/', "\\");
    normalized.trim_start_matches('\\').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SmbSession {
        SmbSession::new(
            "10.0.0.1",
            445,
            Duration::from_millis(100),
            Arc::new(Credentials::default()),
            "SRV01",
        )
    }

    #[test]
    fn test_new_session_is_not_connected() {
        let s = session();
        assert!(!s.is_connected());
        assert_eq!(s.remote_name(), "SRV01");
        assert!(s.current_share().is_none());
    }

    #[test]
    fn test_ops_require_connection() {
        let s = session();
        assert!(matches!(s.list_shares(), Err(SmbError::NotConnected)));
        assert!(matches!(s.select_share("data"), Err(SmbError::NotConnected)));
        assert!(!s.ping());
    }

    #[test]
    fn test_tree_ops_require_selected_share() {
        let s = session();
        assert!(matches!(s.current_tree_id(), Err(SmbError::ShareNotSet)));
    }

    #[test]
    fn test_force_close_is_terminal() {
        let s = session();
        s.force_close();
        // Closed is terminal: connect refuses to restart the session
        assert!(matches!(s.connect(), Err(SmbError::NotConnected)));
        assert!(!s.is_connected());
    }

    #[test]
    fn test_force_close_idempotent_and_concurrent_safe() {
        let s = Arc::new(session());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = Arc::clone(&s);
            handles.push(std::thread::spawn(move || {
                s.force_close();
                s.close();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_close_on_unconnected_session() {
        let s = session();
        s.close();
        s.close();
        assert!(!s.is_connected());
    }

    #[test]
    fn test_remote_name_defaults_to_host() {
        let s = SmbSession::new(
            "10.0.0.2",
            445,
            Duration::from_secs(1),
            Arc::new(Credentials::default()),
            "",
        );
        assert_eq!(s.remote_name(), "10.0.0.2");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/b/c"), "a\\b\\c");
        assert_eq!(normalize_path("\\a\\b"), "a\\b");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("."), ".");
    }
}
