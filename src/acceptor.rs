// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Acceptor (C7) — WebSocket upgrade, auth handshake, and
//! dispatch to the new-session or resume-session path (spec §4.7).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::broker::Broker;
use crate::credential::CredentialDigest;
use crate::error::ErrorCode;
use crate::protocol::{filter_environment_variables, AuthFrame, ServerFrame};
use crate::pump;
use crate::session::SessionId;

pub async fn ws_handler(State(broker): State<Arc<Broker>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(broker, socket))
}

async fn handle_connection(broker: Arc<Broker>, socket: WebSocket) {
    let handshake_timeout = broker.config.handshake_timeout();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let auth_frame = match tokio::time::timeout(handshake_timeout, read_auth_frame(&mut ws_rx)).await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            reject(&mut ws_tx, ErrorCode::AuthMalformed, "missing or malformed auth frame").await;
            return;
        }
        Err(_) => {
            reject(&mut ws_tx, ErrorCode::AuthMalformed, "handshake timed out").await;
            return;
        }
    };

    let digest = CredentialDigest::compute(&auth_frame.api_key, &auth_frame.access_token);
    let extra_env: Vec<(String, String)> =
        filter_environment_variables(&auth_frame.environment_variables).into_iter().collect();

    let outcome = match auth_frame.session_id.as_deref() {
        Some(raw_id) => match raw_id.parse::<SessionId>() {
            Ok(id) => broker.resume_session(id, digest).await.map(|session| (session, true)),
            Err(_) => Err(ErrorCode::UnknownSession),
        },
        None => broker
            .accept_new_session(digest, &auth_frame.api_key, &auth_frame.access_token, &extra_env)
            .await
            .map(|session| (session, false)),
    };

    let (session, resumed) = match outcome {
        Ok(pair) => pair,
        Err(code) => {
            reject(&mut ws_tx, code, &describe(code)).await;
            return;
        }
    };

    info!(session_id = %session.id, resumed, "session attached");

    let socket = match ws_tx.reunite(ws_rx) {
        Ok(socket) => socket,
        Err(_) => {
            warn!(session_id = %session.id, "failed to reunite split socket halves");
            session.end_attach();
            broker.disconnect_session(session.id).await;
            return;
        }
    };

    pump::attach(broker, session, socket, resumed).await;
}

/// Read exactly one client frame and parse it as an [`AuthFrame`]. Binary
/// frames, control frames, or JSON that fails to parse are all treated as
/// a malformed handshake.
async fn read_auth_frame(ws_rx: &mut SplitStream<WebSocket>) -> Option<AuthFrame> {
    match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

async fn reject(ws_tx: &mut SplitSink<WebSocket, Message>, code: ErrorCode, message: &str) {
    let frame = ServerFrame::Error {
        code: code.as_str().to_owned(),
        message: message.to_owned(),
        retry_after_ms: retry_after_hint(code),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = ws_tx.send(Message::Text(text.into())).await;
    }
    let close = CloseFrame { code: code.close_code(), reason: code.as_str().to_owned().into() };
    let _ = ws_tx.send(Message::Close(Some(close))).await;
}

fn describe(code: ErrorCode) -> String {
    match code {
        ErrorCode::AuthMalformed => "auth frame absent or missing required fields".to_owned(),
        ErrorCode::AuthRejected => "credentials rejected by the downstream platform".to_owned(),
        ErrorCode::GlobalCap => "global session cap reached".to_owned(),
        ErrorCode::PerCredentialCap => "per-credential session cap reached".to_owned(),
        ErrorCode::UnknownSession => "no such session".to_owned(),
        ErrorCode::DigestMismatch => "credentials do not match the session on record".to_owned(),
        ErrorCode::SessionBusy => "session is not eligible for resume".to_owned(),
        ErrorCode::ProvisionFailed => "container could not be provisioned".to_owned(),
        ErrorCode::ShellFailed => "shell launch failed".to_owned(),
        ErrorCode::TransportFailed => "transport error".to_owned(),
        ErrorCode::Internal => "internal error".to_owned(),
    }
}

/// Retry-after hint attached to admission denials (spec §10 supplement).
fn retry_after_hint(code: ErrorCode) -> Option<u64> {
    match code {
        ErrorCode::GlobalCap | ErrorCode::PerCredentialCap => Some(ADMISSION_RETRY_AFTER_MS),
        _ => None,
    }
}

const ADMISSION_RETRY_AFTER_MS: u64 = 2_000;

#[cfg(test)]
#[path = "acceptor_tests.rs"]
mod tests;
