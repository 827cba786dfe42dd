// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker ties the registry, admission policy, container supervisor,
//! and orphan timer together behind the operations the acceptor, pump, and
//! shutdown coordinator actually need. No component reaches past it to
//! mutate another component's state directly.

use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::admission::{AdmissionDenial, AdmissionPolicy};
use crate::config::Config;
use crate::container::{ContainerSupervisor, OutputStream};
use crate::credential::CredentialDigest;
use crate::error::ErrorCode;
use crate::metrics::Metrics;
use crate::orphan::{ExpireCallback, OrphanTimer};
use crate::registry::SessionRegistry;
use crate::session::{ControlSignal, Session, SessionId, SessionState};

/// Why a session is being torn down, so the attached pump (if any) knows
/// what to tell the client before the socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The shell process exited on its own — close 1000.
    ShellExited,
    /// The orphan grace period elapsed with nobody resuming.
    OrphanExpired,
    /// The process is shutting down — close 4004.
    Shutdown,
}

pub struct Broker {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<Metrics>,
    pub shutdown: CancellationToken,
    admission: AdmissionPolicy,
    container: Arc<dyn ContainerSupervisor>,
    orphan: OrphanTimer,
}

impl Broker {
    pub fn new(config: Arc<Config>, container: Arc<dyn ContainerSupervisor>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Broker>| {
            let weak = weak.clone();
            let on_expire: ExpireCallback = Arc::new(move |session: Arc<Session>| {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(broker) = weak.upgrade() {
                        broker.terminate_session(session.id, TerminationReason::OrphanExpired).await;
                    }
                })
            });

            Self {
                admission: AdmissionPolicy::new(config.max_total_sessions, config.max_sessions_per_digest),
                registry: Arc::new(SessionRegistry::new()),
                container,
                orphan: OrphanTimer::new(on_expire),
                metrics: Arc::new(Metrics::new()),
                shutdown: CancellationToken::new(),
                config,
            }
        })
    }

    /// New-session path (spec §4.7 step 5): admit, provision, open a shell,
    /// register, and start the output collector.
    pub async fn accept_new_session(
        self: &Arc<Self>,
        digest: CredentialDigest,
        api_key: &str,
        access_token: &str,
        extra_env: &[(String, String)],
    ) -> Result<Arc<Session>, ErrorCode> {
        let id = SessionId::new();

        // Reserve the slot under the registry's single lock before doing
        // anything that suspends (provisioning, opening the shell) — two
        // concurrent connects under the same digest must never both observe
        // room for the last slot (spec §4.5, §4.8).
        if let Err(denial) = self.admission.check(&self.registry, id, digest).await {
            self.metrics.record_rejected();
            return Err(match denial {
                AdmissionDenial::GlobalCap => ErrorCode::GlobalCap,
                AdmissionDenial::PerCredentialCap => ErrorCode::PerCredentialCap,
            });
        }

        let container = match self.container.provision(id, api_key, access_token, extra_env).await {
            Ok(container) => container,
            Err(failure) => {
                warn!(session_id = %id, %failure, "provisioning failed");
                self.registry.release_reservation(id, digest).await;
                return Err(ErrorCode::ProvisionFailed);
            }
        };

        let (exec, output) = match self.container.open_shell(&container).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(session_id = %id, error = %err, "shell launch failed");
                self.container.terminate(&container).await;
                self.registry.release_reservation(id, digest).await;
                return Err(ErrorCode::ShellFailed);
            }
        };

        let session =
            Arc::new(Session::new(id, digest, container, exec, self.config.ring_buffer_bytes));
        session.set_state(SessionState::Active).await;
        session.touch_activity().await;
        self.registry.create(Arc::clone(&session)).await;
        self.metrics.record_admitted();

        self.spawn_collector(Arc::clone(&session), output);

        debug!(session_id = %id, "session admitted");
        Ok(session)
    }

    /// Resume path (spec §4.7 step 4). On success the session's state is
    /// already `Active` and its generation bumped, but `attaching` remains
    /// set — the caller must replay the ring buffer and subscribe to
    /// output before calling [`Session::end_attach`].
    pub async fn resume_session(
        &self,
        id: SessionId,
        digest: CredentialDigest,
    ) -> Result<Arc<Session>, ErrorCode> {
        let session = self.registry.get(id).await.ok_or(ErrorCode::UnknownSession)?;

        if session.credential_digest != digest {
            return Err(ErrorCode::DigestMismatch);
        }
        if session.state().await != SessionState::Orphaned {
            return Err(ErrorCode::SessionBusy);
        }
        if !session.try_begin_attach() {
            return Err(ErrorCode::SessionBusy);
        }

        self.orphan.cancel(&session).await;
        session.clear_orphan_deadline().await;
        session.bump_generation();
        session.set_state(SessionState::Active).await;
        session.touch_activity().await;
        self.metrics.record_resumed();

        debug!(session_id = %id, "session resumed");
        Ok(session)
    }

    /// Disconnect path (spec §4.10): a socket EOF/error on an `Active`
    /// session arms the orphan timer instead of tearing anything down.
    pub async fn disconnect_session(&self, id: SessionId) {
        let Some(session) = self.registry.get(id).await else { return };
        if session.state().await != SessionState::Active {
            return;
        }
        session.set_state(SessionState::Orphaned).await;
        let deadline = session.arm_orphan(self.config.grace_interval()).await;
        self.metrics.record_orphaned();
        self.orphan.arm(Arc::clone(&session), deadline).await;
        debug!(session_id = %id, "session orphaned");
    }

    /// Tear a session down completely: stop the orphan timer, signal the
    /// attached pump (if any) what to tell the client, terminate the
    /// container, and remove the registry entry last (spec §3 Lifecycle).
    pub async fn terminate_session(&self, id: SessionId, reason: TerminationReason) {
        let Some(session) = self.registry.get(id).await else { return };

        let prior_state = session.state().await;
        if matches!(prior_state, SessionState::Terminating | SessionState::Terminated) {
            return;
        }
        session.set_state(SessionState::Terminating).await;

        match prior_state {
            SessionState::Active => self.metrics.record_terminated_from_active(),
            SessionState::Orphaned => self.metrics.record_terminated_from_orphaned(),
            _ => {}
        }

        self.orphan.cancel(&session).await;
        session.clear_orphan_deadline().await;

        match reason {
            TerminationReason::Shutdown => session.signal_control(ControlSignal::Shutdown),
            TerminationReason::ShellExited => session.signal_control(ControlSignal::ShellExited),
            TerminationReason::OrphanExpired => {}
        }

        self.container.terminate(&session.container).await;
        session.set_state(SessionState::Terminated).await;
        self.registry.remove(id).await;

        debug!(session_id = %id, ?reason, "session terminated");
    }

    /// Forward a client-requested PTY resize to the container supervisor.
    pub async fn resize_session(&self, session: &Session, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.container.resize(&session.exec, cols, rows).await
    }

    /// The long-lived task that owns the exec output stream exclusively
    /// (spec §3: `execStream` is owned by the session, but the stream
    /// itself is read by one collector for the container's whole life,
    /// independent of which socket is currently attached).
    fn spawn_collector(self: &Arc<Self>, session: Arc<Session>, mut output: OutputStream) {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match output.next().await {
                    Some(Ok(bytes)) => session.append_output(&bytes).await,
                    Some(Err(err)) => {
                        warn!(session_id = %session.id, error = %err, "exec output stream error");
                        break;
                    }
                    None => break,
                }
            }
            broker.terminate_session(session.id, TerminationReason::ShellExited).await;
        });
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
