// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown Coordinator (C9) — stop admitting new connections, tear every
//! live session down with an explicit reason, and wait out a bounded grace
//! period before letting the process exit (spec §4.9).

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::broker::{Broker, TerminationReason};
use crate::session::SessionState;

/// Drain every session in the registry, waiting up to `grace` for each to
/// reach `Terminated` before giving up on the stragglers.
pub async fn drain(broker: &Arc<Broker>, grace: Duration) {
    broker.shutdown.cancel();

    let sessions = broker.registry.iter_all().await;
    info!(count = sessions.len(), "shutdown: terminating sessions");

    let teardowns = sessions.into_iter().map(|session| {
        let broker = Arc::clone(broker);
        async move {
            broker.terminate_session(session.id, TerminationReason::Shutdown).await;
        }
    });

    let drained = tokio::time::timeout(grace, join_all(teardowns)).await;
    if drained.is_err() {
        let remaining = broker.registry.iter_all().await;
        let states = join_all(remaining.iter().map(|s| s.state())).await;
        let stuck_count = states.into_iter().filter(|s| *s != SessionState::Terminated).count();
        warn!(stuck_count, "shutdown grace period elapsed with sessions still tearing down");
    } else {
        info!("shutdown: all sessions terminated cleanly");
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
