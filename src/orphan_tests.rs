// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::container::{ContainerHandle, ExecHandle};
use crate::credential::CredentialDigest;
use crate::session::SessionId;

fn test_session() -> Arc<Session> {
    Arc::new(Session::new(
        SessionId::new(),
        CredentialDigest::compute("k", "t"),
        ContainerHandle { container_id: "c".to_owned() },
        ExecHandle::for_test(),
        64,
    ))
}

fn counting_callback() -> (ExpireCallback, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let callback: ExpireCallback = Arc::new(move |_session| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });
    (callback, count)
}

#[tokio::test(start_paused = true)]
async fn fires_after_deadline_when_still_orphaned() {
    let (callback, count) = counting_callback();
    let timer = OrphanTimer::new(callback);
    let session = test_session();
    session.set_state(SessionState::Orphaned).await;

    let deadline = Instant::now() + std::time::Duration::from_millis(50);
    timer.arm(Arc::clone(&session), deadline).await;

    tokio::time::advance(std::time::Duration::from_millis(60)).await;
    tokio::task::yield_now().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_prevents_expiry() {
    let (callback, count) = counting_callback();
    let timer = OrphanTimer::new(callback);
    let session = test_session();
    session.set_state(SessionState::Orphaned).await;

    let deadline = Instant::now() + std::time::Duration::from_millis(50);
    timer.arm(Arc::clone(&session), deadline).await;
    timer.cancel(&session).await;

    tokio::time::advance(std::time::Duration::from_millis(60)).await;
    tokio::task::yield_now().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_generation_does_not_fire() {
    let (callback, count) = counting_callback();
    let timer = OrphanTimer::new(callback);
    let session = test_session();
    session.set_state(SessionState::Orphaned).await;

    let deadline = Instant::now() + std::time::Duration::from_millis(50);
    timer.arm(Arc::clone(&session), deadline).await;

    // A resume bumps the generation and flips state back to Active before
    // the timer fires — it must see itself as stale and no-op.
    session.bump_generation();
    session.set_state(SessionState::Active).await;

    tokio::time::advance(std::time::Duration::from_millis(60)).await;
    tokio::task::yield_now().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_the_previous_schedule() {
    let (callback, count) = counting_callback();
    let timer = OrphanTimer::new(callback);
    let session = test_session();
    session.set_state(SessionState::Orphaned).await;

    let first_deadline = Instant::now() + std::time::Duration::from_millis(20);
    timer.arm(Arc::clone(&session), first_deadline).await;

    let second_deadline = Instant::now() + std::time::Duration::from_millis(100);
    timer.arm(Arc::clone(&session), second_deadline).await;

    tokio::time::advance(std::time::Duration::from_millis(50)).await;
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 0, "first schedule must have been cancelled");

    tokio::time::advance(std::time::Duration::from_millis(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
