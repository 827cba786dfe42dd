// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn base() -> Config {
    Config {
        host: "0.0.0.0".to_owned(),
        port: 8080,
        container_image: "ghcr.io/example/shell:latest".to_owned(),
        shell_command: "ably".to_owned(),
        grace_secs: 60,
        handshake_timeout_secs: 30,
        shutdown_grace_secs: 10,
        max_total_sessions: 256,
        max_sessions_per_digest: 4,
        ring_buffer_bytes: 262_144,
        container_memory_bytes: 268_435_456,
        container_nano_cpus: 1_000_000_000,
        log_format: "json".to_owned(),
        log_level: "info".to_owned(),
    }
}

#[test]
fn validate_accepts_defaults() {
    assert!(base().validate().is_ok());
}

#[test]
fn validate_rejects_empty_image() {
    let mut c = base();
    c.container_image = "".to_owned();
    assert!(c.validate().is_err());
}

#[test]
fn validate_rejects_zero_caps() {
    let mut c = base();
    c.max_total_sessions = 0;
    assert!(c.validate().is_err());

    let mut c = base();
    c.max_sessions_per_digest = 0;
    assert!(c.validate().is_err());
}

#[test]
fn durations_convert_from_secs() {
    let c = base();
    assert_eq!(c.grace_interval().as_secs(), 60);
    assert_eq!(c.handshake_timeout().as_secs(), 30);
    assert_eq!(c.shutdown_grace().as_secs(), 10);
}
