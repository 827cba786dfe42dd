// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session data model (spec §3) — the central entity binding one
//! credential pair to one running container and its attached socket.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::container::{ContainerHandle, ExecHandle};
use crate::credential::CredentialDigest;
use crate::ring::RingBuffer;

/// Opaque session identifier, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Session lifecycle state (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Orphaned,
    Terminating,
    Terminated,
}

/// Out-of-band signal delivered to whichever pump currently owns the
/// attached socket, via a watch channel each attach subscribes to fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Run,
    /// A newer socket has taken over this session; stop without sending
    /// anything to the client (it's already reattached elsewhere).
    ReplacedBySocket,
    /// The shell process exited on its own; close 1000.
    ShellExited,
    /// Server is shutting down; send `serverShutdown` then close 4004.
    Shutdown,
}

/// The stateful unit binding credentials to one container and its shell.
///
/// Field mutation discipline (spec §5): only the outbound pump appends to
/// `ring`; only the acceptor and shutdown coordinator mutate registry
/// membership; only the inbound pump updates `last_activity_at`.
pub struct Session {
    pub id: SessionId,
    pub credential_digest: CredentialDigest,
    pub container: ContainerHandle,
    pub exec: ExecHandle,

    /// Live fanout of outbound bytes to whichever pump is currently
    /// attached. A fresh attach subscribes a new receiver; the ring buffer
    /// covers everything a receiver might have missed.
    output_tx: broadcast::Sender<Bytes>,
    ring: Mutex<RingBuffer>,

    state: RwLock<SessionState>,
    pub created_at: Instant,
    last_activity_at: RwLock<Instant>,
    orphan_deadline: RwLock<Option<Instant>>,

    /// Guards against concurrent attach/resume on the same session.
    attaching: AtomicBool,

    /// Bumped on every successful attach; lets a racing orphan-timer
    /// callback detect it fired against a stale generation and no-op.
    generation: AtomicU64,

    control: watch::Sender<ControlSignal>,

    /// Cancellation handle for this session's currently-armed orphan timer,
    /// if any. Owned here so `arm` can atomically replace a prior schedule.
    orphan_cancel: Mutex<Option<CancellationToken>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        credential_digest: CredentialDigest,
        container: ContainerHandle,
        exec: ExecHandle,
        ring_capacity: usize,
    ) -> Self {
        let (output_tx, _) = broadcast::channel(1024);
        let (control, _) = watch::channel(ControlSignal::Run);
        let now = Instant::now();
        Self {
            id,
            credential_digest,
            container,
            exec,
            output_tx,
            ring: Mutex::new(RingBuffer::new(ring_capacity)),
            state: RwLock::new(SessionState::Connecting),
            created_at: now,
            last_activity_at: RwLock::new(now),
            orphan_deadline: RwLock::new(None),
            attaching: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            control,
            orphan_cancel: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    /// Append shell output to the ring buffer and fan it out to an
    /// attached pump, if any. Called only by the outbound pump.
    pub async fn append_output(&self, bytes: &[u8]) {
        self.ring.lock().await.append(bytes);
        // No receivers (nobody attached) is expected while orphaned.
        let _ = self.output_tx.send(Bytes::copy_from_slice(bytes));
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<Bytes> {
        self.output_tx.subscribe()
    }

    pub async fn replay_snapshot(&self) -> Vec<u8> {
        self.ring.lock().await.snapshot()
    }

    pub async fn clear_output(&self) {
        self.ring.lock().await.clear();
    }

    pub async fn touch_activity(&self) {
        *self.last_activity_at.write().await = Instant::now();
    }

    pub async fn last_activity(&self) -> Instant {
        *self.last_activity_at.read().await
    }

    /// Arm the orphan deadline at `last_activity + grace` and return it.
    pub async fn arm_orphan(&self, grace: Duration) -> Instant {
        let deadline = self.last_activity().await + grace;
        *self.orphan_deadline.write().await = Some(deadline);
        deadline
    }

    pub async fn clear_orphan_deadline(&self) {
        *self.orphan_deadline.write().await = None;
    }

    pub async fn orphan_deadline(&self) -> Option<Instant> {
        *self.orphan_deadline.read().await
    }

    /// Attempt to acquire the attach guard. Returns `false` if another
    /// attach/resume is already in flight on this session.
    pub fn try_begin_attach(&self) -> bool {
        self.attaching.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn end_attach(&self) {
        self.attaching.store(false, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Advance the generation counter, invalidating any orphan-timer
    /// callback armed against an earlier generation. Returns the new value.
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Send a control signal to whichever pump currently watches this
    /// session (a no-op if nothing is attached).
    pub fn signal_control(&self, signal: ControlSignal) {
        let _ = self.control.send(signal);
    }

    pub fn control_receiver(&self) -> watch::Receiver<ControlSignal> {
        self.control.subscribe()
    }

    /// Install a new orphan-timer cancellation handle, returning whatever
    /// was previously armed so the caller can cancel it.
    pub async fn replace_orphan_cancel(&self, token: CancellationToken) -> Option<CancellationToken> {
        self.orphan_cancel.lock().await.replace(token)
    }

    pub async fn take_orphan_cancel(&self) -> Option<CancellationToken> {
        self.orphan_cancel.lock().await.take()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
