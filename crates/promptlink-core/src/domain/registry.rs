//! Connection Registry & heartbeat bookkeeping.
//!
//! Tracks every accepted socket, which one (if any) holds the single target
//! slot, and which token each socket presented.  The registry itself does no
//! I/O: it talks to each socket through its [`ConnectionSink`].
//!
//! # Two-tick reclamation (for beginners)
//!
//! ```text
//!  sweep N:   alive=true  ──► alive=false, probe sent
//!             (peer answers: mark_alive ──► alive=true)
//!  sweep N+1: alive=true  ──► survives, probed again
//!             alive=false ──► closed and removed
//! ```
//!
//! A silent peer therefore survives one sweep and is reclaimed on the second.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::domain::sink::{ConnectionSink, Liveness};
use crate::domain::types::{ConnectionId, SessionToken};

/// One live connection.
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub sink: Arc<dyn ConnectionSink>,
    pub bound_token: Option<SessionToken>,
    pub is_target: bool,
    pub is_alive: bool,
    pub connected_at: SystemTime,
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("id", &self.id)
            .field("bound_token", &self.bound_token)
            .field("is_target", &self.is_target)
            .field("is_alive", &self.is_alive)
            .finish_non_exhaustive()
    }
}

/// Owns every connection entry plus the target slot and the token index.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, ConnectionEntry>,
    target: Option<ConnectionId>,
    by_token: HashMap<SessionToken, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted connection, alive and unauthenticated.
    pub fn insert(&mut self, id: ConnectionId, sink: Arc<dyn ConnectionSink>, now: SystemTime) {
        self.entries.insert(
            id,
            ConnectionEntry {
                id,
                sink,
                bound_token: None,
                is_target: false,
                is_alive: true,
                connected_at: now,
            },
        );
    }

    /// Removes a connection, clearing the target slot and token index if it
    /// held them.  The token session itself is untouched.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.entries.remove(&id)?;
        if self.target == Some(id) {
            self.target = None;
            info!(conn = %id, "target connection removed");
        }
        if let Some(token) = &entry.bound_token {
            if self.by_token.get(token) == Some(&id) {
                self.by_token.remove(token);
            }
        }
        Some(entry)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Binds `token` to connection `id`.
    ///
    /// A token is held by at most one connection: if another socket held it,
    /// that socket loses its binding.  Returns `false` if `id` is unknown.
    pub fn bind_token(&mut self, id: ConnectionId, token: SessionToken) -> bool {
        if !self.entries.contains_key(&id) {
            return false;
        }

        if let Some(previous) = self.by_token.insert(token.clone(), id) {
            if previous != id {
                if let Some(other) = self.entries.get_mut(&previous) {
                    other.bound_token = None;
                    debug!(from = %previous, to = %id, "token moved to a new connection");
                }
            }
        }

        if let Some(entry) = self.entries.get_mut(&id) {
            if let Some(old) = entry.bound_token.replace(token.clone()) {
                if old != token && self.by_token.get(&old) == Some(&id) {
                    self.by_token.remove(&old);
                }
            }
        }
        true
    }

    /// Drops whatever connection binding `token` has (used when the token
    /// expires).
    pub fn unbind_token(&mut self, token: &SessionToken) {
        if let Some(id) = self.by_token.remove(token) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.bound_token = None;
            }
        }
    }

    /// Whether `token` is currently held by connection `id`.
    pub fn is_bound_to(&self, token: &SessionToken, id: ConnectionId) -> bool {
        self.by_token.get(token) == Some(&id)
    }

    pub fn connection_for_token(&self, token: &SessionToken) -> Option<ConnectionId> {
        self.by_token.get(token).copied()
    }

    /// Puts `id` in the target slot, demoting whoever held it.
    ///
    /// Returns the demoted connection, or `None` if the slot was empty or
    /// already held by `id`.  Unknown ids leave the registry untouched and
    /// return `None`.
    pub fn register_target(&mut self, id: ConnectionId) -> Option<ConnectionId> {
        if !self.entries.contains_key(&id) {
            return None;
        }

        let previous = self.target.replace(id).filter(|prev| *prev != id);
        if let Some(prev) = previous {
            if let Some(entry) = self.entries.get_mut(&prev) {
                entry.is_target = false;
            }
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.is_target = true;
        }
        info!(conn = %id, "target registered");
        previous
    }

    pub fn lookup_target(&self) -> Option<&ConnectionEntry> {
        self.target.and_then(|id| self.entries.get(&id))
    }

    /// Marks a connection as having shown signs of life.
    pub fn mark_alive(&mut self, id: ConnectionId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.is_alive = true;
        }
    }

    /// Runs one heartbeat tick and returns the connections it reclaimed.
    ///
    /// Entries still flagged dead from the previous tick, and entries whose
    /// probe cannot be sent, are closed and removed.  Every other entry is
    /// flagged dead and probed.
    pub fn heartbeat_sweep(&mut self) -> Vec<ConnectionId> {
        let mut dead = Vec::new();

        for entry in self.entries.values_mut() {
            if !entry.is_alive {
                dead.push(entry.id);
                continue;
            }
            entry.is_alive = false;
            match entry.sink.probe() {
                Ok(Liveness::Pending) => {}
                Ok(Liveness::Confirmed) => entry.is_alive = true,
                Err(_) => dead.push(entry.id),
            }
        }

        for id in &dead {
            if let Some(entry) = self.remove(*id) {
                entry.sink.close();
                info!(conn = %id, "reclaimed unresponsive connection");
            }
        }
        dead
    }

    /// Closes and removes every connection.  Returns how many there were.
    pub fn close_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.sink.close();
        }
        self.target = None;
        self.by_token.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of connections holding a token.
    pub fn authenticated_count(&self) -> usize {
        self.by_token.len()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
