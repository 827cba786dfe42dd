// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight per-process counters surfaced only via `/healthz`. Not a
//! metrics/exporter stack — just the ambient visibility the teacher's
//! `LifecycleState` counters (`ws_client_count`, `bytes_written`) model.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub active_sessions: AtomicI64,
    pub orphaned_sessions: AtomicI64,
    pub total_admitted: AtomicU64,
    pub total_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.total_admitted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.orphaned_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resumed(&self) {
        self.orphaned_sessions.fetch_sub(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminated_from_orphaned(&self) {
        self.orphaned_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_terminated_from_active(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            orphaned_sessions: self.orphaned_sessions.load(Ordering::Relaxed),
            total_admitted: self.total_admitted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub active_sessions: i64,
    pub orphaned_sessions: i64,
    pub total_admitted: u64,
    pub total_rejected: u64,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
