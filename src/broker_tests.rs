// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream;

use super::*;
use crate::container::{ContainerHandle, ExecHandle, OutputStream, ProvisionFailure};

/// Supervisor double that never touches a real container engine. The
/// output stream never ends, so sessions it opens stay `Active` until the
/// test tears them down explicitly.
struct FakeSupervisor {
    fail_provision: bool,
}

impl ContainerSupervisor for FakeSupervisor {
    fn provision(
        &self,
        _session_id: SessionId,
        _api_key: &str,
        _access_token: &str,
        _extra_env: &[(String, String)],
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle, ProvisionFailure>> + Send + '_>> {
        let fail = self.fail_provision;
        Box::pin(async move {
            if fail {
                Err(ProvisionFailure::ResourceExhausted)
            } else {
                Ok(ContainerHandle { container_id: "fake".to_owned() })
            }
        })
    }

    fn open_shell(
        &self,
        _container: &ContainerHandle,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<(ExecHandle, OutputStream)>> + Send + '_>> {
        Box::pin(async move {
            let empty: OutputStream = Box::pin(stream::pending());
            Ok((ExecHandle::for_test(), empty))
        })
    }

    fn resize(
        &self,
        _exec: &ExecHandle,
        _cols: u16,
        _rows: u16,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn terminate(&self, _container: &ContainerHandle) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

fn test_config() -> Config {
    Config {
        host: "0.0.0.0".to_owned(),
        port: 0,
        container_image: "ghcr.io/example/shell:latest".to_owned(),
        shell_command: "ably".to_owned(),
        grace_secs: 60,
        handshake_timeout_secs: 30,
        shutdown_grace_secs: 10,
        max_total_sessions: 256,
        max_sessions_per_digest: 4,
        ring_buffer_bytes: 4096,
        container_memory_bytes: 268_435_456,
        container_nano_cpus: 1_000_000_000,
        log_format: "json".to_owned(),
        log_level: "info".to_owned(),
    }
}

fn test_broker(config: Config) -> Arc<Broker> {
    Broker::new(Arc::new(config), Arc::new(FakeSupervisor { fail_provision: false }))
}

#[tokio::test]
async fn accept_new_session_registers_and_activates() {
    let broker = test_broker(test_config());
    let digest = CredentialDigest::compute("k", "t");
    let session = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap();

    assert_eq!(session.state().await, SessionState::Active);
    assert!(broker.registry.get(session.id).await.is_some());
}

#[tokio::test]
async fn accept_new_session_propagates_provision_failure() {
    let config = test_config();
    let broker = Broker::new(Arc::new(config), Arc::new(FakeSupervisor { fail_provision: true }));
    let digest = CredentialDigest::compute("k", "t");
    let err = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap_err();
    assert_eq!(err, ErrorCode::ProvisionFailed);
}

#[tokio::test]
async fn accept_new_session_respects_global_cap() {
    let mut config = test_config();
    config.max_total_sessions = 1;
    let broker = test_broker(config);

    broker.accept_new_session(CredentialDigest::compute("a", "1"), "a", "1", &[]).await.unwrap();
    let err =
        broker.accept_new_session(CredentialDigest::compute("b", "2"), "b", "2", &[]).await.unwrap_err();
    assert_eq!(err, ErrorCode::GlobalCap);
}

#[tokio::test]
async fn resume_session_rejects_unknown_id() {
    let broker = test_broker(test_config());
    let err = broker.resume_session(SessionId::new(), CredentialDigest::compute("k", "t")).await.unwrap_err();
    assert_eq!(err, ErrorCode::UnknownSession);
}

#[tokio::test]
async fn resume_session_rejects_digest_mismatch() {
    let broker = test_broker(test_config());
    let digest = CredentialDigest::compute("k", "t");
    let session = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap();
    broker.disconnect_session(session.id).await;

    let wrong = CredentialDigest::compute("other", "creds");
    let err = broker.resume_session(session.id, wrong).await.unwrap_err();
    assert_eq!(err, ErrorCode::DigestMismatch);
}

#[tokio::test]
async fn resume_session_rejects_when_not_orphaned() {
    let broker = test_broker(test_config());
    let digest = CredentialDigest::compute("k", "t");
    let session = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap();

    // Still Active — never disconnected.
    let err = broker.resume_session(session.id, digest).await.unwrap_err();
    assert_eq!(err, ErrorCode::SessionBusy);
}

#[tokio::test]
async fn resume_session_succeeds_after_disconnect() {
    let broker = test_broker(test_config());
    let digest = CredentialDigest::compute("k", "t");
    let session = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap();
    broker.disconnect_session(session.id).await;
    assert_eq!(session.state().await, SessionState::Orphaned);

    let resumed = broker.resume_session(session.id, digest).await.unwrap();
    assert_eq!(resumed.id, session.id);
    assert_eq!(resumed.state().await, SessionState::Active);
    resumed.end_attach();
}

#[tokio::test]
async fn disconnect_session_is_noop_when_not_active() {
    let broker = test_broker(test_config());
    // No such session registered at all.
    broker.disconnect_session(SessionId::new()).await;
}

#[tokio::test]
async fn terminate_session_removes_from_registry_and_is_idempotent() {
    let broker = test_broker(test_config());
    let digest = CredentialDigest::compute("k", "t");
    let session = broker.accept_new_session(digest, "k", "t", &[]).await.unwrap();
    let id = session.id;

    broker.terminate_session(id, TerminationReason::Shutdown).await;
    assert!(broker.registry.get(id).await.is_none());

    // Second call on an already-removed id must not panic.
    broker.terminate_session(id, TerminationReason::Shutdown).await;
}
