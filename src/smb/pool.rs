//! Per-host SMB connection pool
//!
//! Keeps a bounded LIFO of idle sessions per host and tracks every
//! session currently handed out, so a host deadline can force-close
//! in-flight connections as well as idle ones.
//!
//! # Connection Lifecycle
//!
//! - Created on demand; a fresh session is registered as in-use
//!   *before* its connect handshake so `force_close_all` can interrupt
//!   a hung handshake
//! - Validated with a ping before reuse; dead sessions are dropped
//! - Returned to the idle list up to the per-host cap, closed beyond it
//!
//! The pool mutex is held only across collection manipulation, never
//! across I/O.

use crate::creds::Credentials;
use crate::error::SmbResult;
use crate::smb::session::SmbSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct PoolState {
    idle: HashMap<String, Vec<Arc<SmbSession>>>,
    in_use: Vec<Arc<SmbSession>>,
}

impl PoolState {
    fn remove_in_use(&mut self, session: &Arc<SmbSession>) {
        self.in_use.retain(|s| !Arc::ptr_eq(s, session));
    }
}

/// Pool of SMB sessions keyed by host
pub struct SmbPool {
    max_per_host: usize,
    state: Mutex<PoolState>,
}

impl SmbPool {
    pub fn new(max_per_host: usize) -> Self {
        SmbPool {
            max_per_host,
            state: Mutex::new(PoolState {
                idle: HashMap::new(),
                in_use: Vec::new(),
            }),
        }
    }

    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    /// Number of sessions currently handed out
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Number of idle sessions for a host
    pub fn idle_count(&self, host: &str) -> usize {
        self.state
            .lock()
            .idle
            .get(host)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Acquire a session for a host, reusing an idle one when alive.
    pub fn acquire(
        &self,
        host: &str,
        remote_name: &str,
        creds: &Arc<Credentials>,
        timeout: Duration,
    ) -> SmbResult<Arc<SmbSession>> {
        // Reuse path: pop idle, validate outside the lock
        loop {
            let candidate = {
                let mut state = self.state.lock();
                let candidate = state.idle.get_mut(host).and_then(|v| v.pop());
                if let Some(session) = &candidate {
                    state.in_use.push(Arc::clone(session));
                }
                candidate
            };

            let Some(session) = candidate else { break };

            if session.ping() {
                debug!(host = %host, "Reusing pooled session");
                return Ok(session);
            }

            debug!(host = %host, "Pooled session is dead, dropping");
            self.state.lock().remove_in_use(&session);
            session.close();
        }

        // Fresh session: registered as in-use before connect so a
        // force_close_all during the handshake interrupts it
        let session = Arc::new(SmbSession::new(
            host,
            445,
            timeout,
            Arc::clone(creds),
            remote_name,
        ));

        self.state.lock().in_use.push(Arc::clone(&session));

        if let Err(e) = session.connect() {
            self.state.lock().remove_in_use(&session);
            return Err(e);
        }

        Ok(session)
    }

    /// Return a session to the pool; beyond the per-host cap it is
    /// closed instead.
    pub fn release(&self, host: &str, session: Arc<SmbSession>) {
        let keep = {
            let mut state = self.state.lock();
            state.remove_in_use(&session);

            let idle = state.idle.entry(host.to_string()).or_default();
            if idle.len() < self.max_per_host {
                idle.push(Arc::clone(&session));
                true
            } else {
                false
            }
        };

        if !keep {
            session.close();
        }
    }

    /// Gracefully close every idle session and clear the pool.
    pub fn close_all(&self) {
        let idle: Vec<Arc<SmbSession>> = {
            let mut state = self.state.lock();
            state.idle.drain().flat_map(|(_, v)| v).collect()
        };
        for session in idle {
            session.close();
        }
    }

    /// Force-close every session, in-use and idle, and clear both
    /// collections. Tasks still holding a session see I/O errors on
    /// their next operation and unwind.
    pub fn force_close_all(&self) {
        let (in_use, idle) = {
            let mut state = self.state.lock();
            let in_use = std::mem::take(&mut state.in_use);
            let idle: Vec<Arc<SmbSession>> =
                state.idle.drain().flat_map(|(_, v)| v).collect();
            (in_use, idle)
        };

        if !in_use.is_empty() || !idle.is_empty() {
            warn!(
                active = in_use.len(),
                pooled = idle.len(),
                "Force-closing pool connections"
            );
        }

        for session in in_use.iter().chain(idle.iter()) {
            session.force_close();
        }
    }
}

impl Drop for SmbPool {
    fn drop(&mut self) {
        self.close_all();
    }
}
