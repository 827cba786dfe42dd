// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphan Timer (C6) — per-session grace-period clock. Re-architected away
//! from ad-hoc setTimeout/clearTimeout (spec §9): a proper cancellable
//! timer primitive, with a generation counter on the session breaking the
//! "timer fired but resume already happened" race.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{Session, SessionState};

pub type ExpireCallback =
    Arc<dyn Fn(Arc<Session>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Schedules and cancels per-session expiry callbacks. One instance is
/// shared across all sessions; each `arm` spawns its own cancellable wait.
pub struct OrphanTimer {
    on_expire: ExpireCallback,
}

impl OrphanTimer {
    pub fn new(on_expire: ExpireCallback) -> Self {
        Self { on_expire }
    }

    /// Schedule termination of `session` at `deadline` unless it is
    /// resumed, re-armed, or cancelled first. Arming an already-armed
    /// session replaces the previous schedule.
    pub async fn arm(&self, session: Arc<Session>, deadline: Instant) {
        let token = CancellationToken::new();
        if let Some(previous) = session.replace_orphan_cancel(token.clone()).await {
            previous.cancel();
        }

        let generation = session.generation();
        let on_expire = Arc::clone(&self.on_expire);
        let wait_until = tokio::time::Instant::from_std(deadline);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(wait_until) => {
                    // Tie-break (spec §4.6): a resume that bumped the
                    // generation between firing and now wins; a stale
                    // generation or non-Orphaned state makes this a no-op.
                    if session.generation() == generation && session.state().await == SessionState::Orphaned {
                        debug!(session_id = %session.id, "orphan deadline reached");
                        on_expire(session).await;
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Disarm any schedule for `session` (e.g. on successful resume).
    pub async fn cancel(&self, session: &Session) {
        if let Some(token) = session.take_orphan_cancel().await {
            token.cancel();
        }
    }
}

#[cfg(test)]
#[path = "orphan_tests.rs"]
mod tests;
