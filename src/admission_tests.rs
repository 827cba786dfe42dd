// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::container::{ContainerHandle, ExecHandle};
use crate::session::Session;

fn make_session(digest: CredentialDigest) -> Arc<Session> {
    Arc::new(Session::new(
        SessionId::new(),
        digest,
        ContainerHandle { container_id: "c".to_owned() },
        ExecHandle::for_test(),
        64,
    ))
}

#[tokio::test]
async fn admits_under_both_caps() {
    let registry = SessionRegistry::new();
    let policy = AdmissionPolicy::new(10, 10);
    let result = policy.check(&registry, SessionId::new(), CredentialDigest::compute("k", "t")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn rejects_at_global_cap() {
    let registry = SessionRegistry::new();
    let policy = AdmissionPolicy::new(1, 10);
    registry.create(make_session(CredentialDigest::compute("a", "1"))).await;

    let result =
        policy.check(&registry, SessionId::new(), CredentialDigest::compute("b", "2")).await;
    assert_eq!(result, Err(AdmissionDenial::GlobalCap));
}

#[tokio::test]
async fn rejects_at_per_credential_cap_before_global_cap() {
    let registry = SessionRegistry::new();
    let policy = AdmissionPolicy::new(10, 1);
    let digest = CredentialDigest::compute("k", "t");
    registry.create(make_session(digest)).await;

    let result = policy.check(&registry, SessionId::new(), digest).await;
    assert_eq!(result, Err(AdmissionDenial::PerCredentialCap));
}

#[tokio::test]
async fn different_credential_is_unaffected_by_another_credentials_cap() {
    let registry = SessionRegistry::new();
    let policy = AdmissionPolicy::new(10, 1);
    registry.create(make_session(CredentialDigest::compute("a", "1"))).await;

    let result =
        policy.check(&registry, SessionId::new(), CredentialDigest::compute("b", "2")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn concurrent_reserves_under_the_same_digest_cannot_both_pass_the_cap() {
    let registry = Arc::new(SessionRegistry::new());
    let policy = AdmissionPolicy::new(10, 1);
    let digest = CredentialDigest::compute("k", "t");

    let first = policy.check(&registry, SessionId::new(), digest).await;
    let second = policy.check(&registry, SessionId::new(), digest).await;

    assert!(first.is_ok());
    assert_eq!(second, Err(AdmissionDenial::PerCredentialCap));
    assert_eq!(registry.count_by_digest(digest).await, 1);
}
