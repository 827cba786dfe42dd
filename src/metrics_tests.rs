// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn admitted_then_orphaned_then_resumed_round_trips_active_count() {
    let metrics = Metrics::new();
    metrics.record_admitted();
    metrics.record_admitted();
    assert_eq!(metrics.snapshot().active_sessions, 2);

    metrics.record_orphaned();
    let snap = metrics.snapshot();
    assert_eq!(snap.active_sessions, 1);
    assert_eq!(snap.orphaned_sessions, 1);

    metrics.record_resumed();
    let snap = metrics.snapshot();
    assert_eq!(snap.active_sessions, 2);
    assert_eq!(snap.orphaned_sessions, 0);
}

#[test]
fn rejected_does_not_touch_active_count() {
    let metrics = Metrics::new();
    metrics.record_rejected();
    metrics.record_rejected();
    let snap = metrics.snapshot();
    assert_eq!(snap.total_rejected, 2);
    assert_eq!(snap.active_sessions, 0);
}

#[test]
fn termination_from_orphaned_and_active_each_decrement_the_right_counter() {
    let metrics = Metrics::new();
    metrics.record_admitted();
    metrics.record_admitted();
    metrics.record_orphaned();

    metrics.record_terminated_from_orphaned();
    assert_eq!(metrics.snapshot().orphaned_sessions, 0);
    assert_eq!(metrics.snapshot().active_sessions, 1);

    metrics.record_terminated_from_active();
    assert_eq!(metrics.snapshot().active_sessions, 0);
}
