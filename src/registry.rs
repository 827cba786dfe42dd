// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Registry (C5) — in-memory map of live + orphaned sessions,
//! indexed by credential digest for admission checks and resume lookups.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::admission::AdmissionDenial;
use crate::credential::CredentialDigest;
use crate::session::Session;
use crate::session::SessionId;

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Arc<Session>>,
    by_digest: HashMap<CredentialDigest, HashSet<SessionId>>,
}

/// `sessionId -> Session` plus the secondary `credentialDigest -> sessionId`
/// index. Both maps live behind one lock so that checking admission caps
/// and reserving a slot happen as a single atomic operation (spec §4.5:
/// "All operations are serialized under a single mutex"); per-session
/// field mutations happen under the session's own guards, not this lock.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check both admission caps against `digest` and, if
    /// neither would be exceeded, reserve `id`'s slot in the by-digest
    /// index before any `await` point a caller might hit while
    /// provisioning the container (spec §4.8). Reserved-but-not-yet-
    /// `create`d sessions already count toward both caps. Roll back with
    /// [`Self::release_reservation`] if provisioning never completes.
    pub async fn reserve(
        &self,
        id: SessionId,
        digest: CredentialDigest,
        max_total_sessions: usize,
        max_sessions_per_digest: usize,
    ) -> Result<(), AdmissionDenial> {
        let mut inner = self.inner.write().await;
        let total: usize = inner.by_digest.values().map(HashSet::len).sum();
        if total >= max_total_sessions {
            return Err(AdmissionDenial::GlobalCap);
        }
        let per_digest = inner.by_digest.get(&digest).map(HashSet::len).unwrap_or(0);
        if per_digest >= max_sessions_per_digest {
            return Err(AdmissionDenial::PerCredentialCap);
        }
        inner.by_digest.entry(digest).or_default().insert(id);
        Ok(())
    }

    /// Release a reservation that never became a real session — the
    /// container or shell failed to come up after [`Self::reserve`]
    /// succeeded.
    pub async fn release_reservation(&self, id: SessionId, digest: CredentialDigest) {
        let mut inner = self.inner.write().await;
        if let Some(set) = inner.by_digest.get_mut(&digest) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_digest.remove(&digest);
            }
        }
    }

    /// Install the real `Session` for an id already reserved by
    /// [`Self::reserve`] (the by-digest entry is idempotent if it's already
    /// there).
    pub async fn create(&self, session: Arc<Session>) {
        let id = session.id;
        let digest = session.credential_digest;
        let mut inner = self.inner.write().await;
        inner.by_digest.entry(digest).or_default().insert(id);
        inner.sessions.insert(id, session);
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    /// Remove a session from C5 entirely. Per invariant 3, this must only
    /// be called once the session has reached `Terminated`.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(&id);
        if let Some(ref session) = removed {
            let digest = session.credential_digest;
            if let Some(set) = inner.by_digest.get_mut(&digest) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_digest.remove(&digest);
                }
            }
        }
        removed
    }

    /// Count of live or orphaned (or reserved-but-pending) sessions sharing
    /// `digest` — Orphaned sessions count toward admission caps (spec §9
    /// open question).
    pub async fn count_by_digest(&self, digest: CredentialDigest) -> usize {
        self.inner.read().await.by_digest.get(&digest).map(HashSet::len).unwrap_or(0)
    }

    pub async fn total_count(&self) -> usize {
        self.inner.read().await.by_digest.values().map(HashSet::len).sum()
    }

    pub async fn iter_all(&self) -> Vec<Arc<Session>> {
        self.inner.read().await.sessions.values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
