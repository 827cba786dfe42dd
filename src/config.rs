// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Terminal-session broker: accepts WebSocket connections, authenticates
/// them, and bridges them to a sandboxed shell running in a container.
#[derive(Debug, Parser, Clone)]
#[command(name = "termbroker", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "BROKER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "BROKER_PORT", default_value = "8080")]
    pub port: u16,

    /// Container image reference used to provision each session's shell.
    #[arg(long, env = "BROKER_CONTAINER_IMAGE")]
    pub container_image: String,

    /// Interactive shell command run as the sole process in the container
    /// (the downstream CLI's interactive entry point).
    #[arg(long, env = "BROKER_SHELL_COMMAND", default_value = "ably")]
    pub shell_command: String,

    /// Grace interval (seconds) an orphaned session may wait before being
    /// terminated.
    #[arg(long, env = "BROKER_GRACE_SECS", default_value = "60")]
    pub grace_secs: u64,

    /// WebSocket handshake timeout (seconds): how long the acceptor waits
    /// for the auth frame before closing.
    #[arg(long, env = "BROKER_HANDSHAKE_TIMEOUT_SECS", default_value = "30")]
    pub handshake_timeout_secs: u64,

    /// Shutdown grace period (seconds): how long the shutdown coordinator
    /// waits for containers to terminate before forcing exit.
    #[arg(long, env = "BROKER_SHUTDOWN_GRACE_SECS", default_value = "10")]
    pub shutdown_grace_secs: u64,

    /// Maximum number of live or orphaned sessions across all credentials.
    #[arg(long, env = "BROKER_MAX_TOTAL_SESSIONS", default_value = "256")]
    pub max_total_sessions: usize,

    /// Maximum number of live or orphaned sessions per credential digest.
    #[arg(long, env = "BROKER_MAX_SESSIONS_PER_DIGEST", default_value = "4")]
    pub max_sessions_per_digest: usize,

    /// Output ring buffer capacity in bytes, per session.
    #[arg(long, env = "BROKER_RING_BUFFER_BYTES", default_value = "262144")]
    pub ring_buffer_bytes: usize,

    /// Container memory limit in bytes.
    #[arg(long, env = "BROKER_CONTAINER_MEMORY_BYTES", default_value = "268435456")]
    pub container_memory_bytes: i64,

    /// Container CPU quota, in nanocpus (1_000_000_000 = one full core).
    #[arg(long, env = "BROKER_CONTAINER_NANO_CPUS", default_value = "1000000000")]
    pub container_nano_cpus: u64,

    /// Log format: `json` or `text`.
    #[arg(long, env = "BROKER_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "BROKER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn grace_interval(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.container_image.trim().is_empty() {
            anyhow::bail!("--container-image must not be empty");
        }
        if self.max_total_sessions == 0 {
            anyhow::bail!("--max-total-sessions must be at least 1");
        }
        if self.max_sessions_per_digest == 0 {
            anyhow::bail!("--max-sessions-per-digest must be at least 1");
        }
        if self.ring_buffer_bytes == 0 {
            anyhow::bail!("--ring-buffer-bytes must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
