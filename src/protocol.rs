// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket wire protocol (spec §6.1).
//!
//! The auth frame and control messages are internally-tagged JSON; binary
//! frames carry raw terminal output/input bytes with no framing at all.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// First client→server text frame on every connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFrame {
    pub api_key: String,
    pub access_token: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
}

/// Env var keys the broker will forward into the container beyond the two
/// credential variables it injects itself (spec §6.1).
const ENV_ALLOW_LIST: &[&str] = &["LANG", "TERM", "COOP_LOCALE", "COOP_TIMEZONE"];

/// Filter a client-supplied environment map down to the allow-listed keys.
/// Unknown keys are silently dropped, per spec.
pub fn filter_environment_variables(vars: &HashMap<String, String>) -> HashMap<String, String> {
    vars.iter()
        .filter(|(k, _)| ENV_ALLOW_LIST.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Client→server control message recognized on text frames (spec §4.4).
/// Any text frame that fails to parse as one of these `type`s is treated
/// as stdin payload, not as a protocol error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Resize { cols: u16, rows: u16 },
    Ping {},
}

/// Server→client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Hello {
        #[serde(rename = "sessionId")]
        session_id: String,
        resumed: bool,
    },
    Error {
        code: String,
        message: String,
        #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    Pong {},
    ServerShutdown {},
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
