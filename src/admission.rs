// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission Policy (C8) — global and per-credential session caps with
//! explicit, non-queueing rejection.

use crate::credential::CredentialDigest;
use crate::registry::SessionRegistry;
use crate::session::SessionId;

/// Explicit reason a new session was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenial {
    GlobalCap,
    PerCredentialCap,
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub max_total_sessions: usize,
    pub max_sessions_per_digest: usize,
}

impl AdmissionPolicy {
    pub fn new(max_total_sessions: usize, max_sessions_per_digest: usize) -> Self {
        Self { max_total_sessions, max_sessions_per_digest }
    }

    /// Check whether one more session under `digest` may be admitted and,
    /// if so, reserve `id`'s slot in the same atomic step (spec §4.5) —
    /// two concurrent callers with the same digest can never both observe
    /// room for the last slot. No queueing: callers retry later at their
    /// own discretion. Release the reservation with
    /// [`SessionRegistry::release_reservation`] if provisioning fails.
    pub async fn check(
        &self,
        registry: &SessionRegistry,
        id: SessionId,
        digest: CredentialDigest,
    ) -> Result<(), AdmissionDenial> {
        registry.reserve(id, digest, self.max_total_sessions, self.max_sessions_per_digest).await
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
