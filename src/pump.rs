// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Pump (C4) — binds one WebSocket to a session's exec stream for as
//! long as that socket stays attached. Outbound bytes are delivered via
//! the session's live broadcast channel (fed by the collector task in
//! [`crate::broker`]); inbound bytes are written straight to the exec
//! stream's stdin. The pump never terminates the container — it only
//! ever hands the session back to [`Broker::disconnect_session`].

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::broker::Broker;
use crate::protocol::{ControlMessage, ServerFrame};
use crate::session::{ControlSignal, Session};

/// Attach `socket` to `session`. Sends `hello` (and, on resume, the ring
/// buffer replay) before entering the live pump loop.
pub async fn attach(broker: Arc<Broker>, session: Arc<Session>, socket: WebSocket, resumed: bool) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe before the replay snapshot so no live byte can be missed
    // between the two; the snapshot may then overlap the first live bytes
    // by a few, which is harmless for a byte-transparent terminal stream.
    // This also covers the fresh-session path: the collector may already be
    // appending bytes to the ring buffer before this socket ever attaches
    // (it's spawned as soon as the shell opens), so replaying unconditionally
    // recovers anything broadcast to zero subscribers in that window.
    let mut output_rx = session.subscribe_output();
    let mut control_rx = session.control_receiver();

    let hello = ServerFrame::Hello { session_id: session.id.to_string(), resumed };
    if send_json(&mut ws_tx, &hello).await.is_err() {
        session.end_attach();
        broker.disconnect_session(session.id).await;
        return;
    }

    let replay = session.replay_snapshot().await;
    if !replay.is_empty() && ws_tx.send(Message::Binary(replay.into())).await.is_err() {
        session.end_attach();
        broker.disconnect_session(session.id).await;
        return;
    }
    session.end_attach();

    loop {
        tokio::select! {
            changed = control_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let signal = *control_rx.borrow_and_update();
                match signal {
                    ControlSignal::Run => continue,
                    ControlSignal::ReplacedBySocket => return,
                    ControlSignal::ShellExited => {
                        let _ = close(&mut ws_tx, 1000, "shell exited").await;
                        return;
                    }
                    ControlSignal::Shutdown => {
                        let _ = send_json(&mut ws_tx, &ServerFrame::ServerShutdown {}).await;
                        let _ = close(&mut ws_tx, 4004, "server shutting down").await;
                        return;
                    }
                }
            }

            output = output_rx.recv() => {
                match output {
                    Ok(bytes) => {
                        if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(session_id = %session.id, skipped, "output receiver lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };

                match msg {
                    Message::Text(text) => {
                        session.touch_activity().await;
                        if let Ok(ctrl) = serde_json::from_str::<ControlMessage>(&text) {
                            match handle_control(&broker, &session, &mut ws_tx, ctrl).await {
                                Ok(()) => {}
                                Err(()) => break,
                            }
                        } else if session.exec.write_all(text.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(data) => {
                        session.touch_activity().await;
                        if session.exec.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    broker.disconnect_session(session.id).await;
}

async fn handle_control(
    broker: &Broker,
    session: &Session,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ctrl: ControlMessage,
) -> Result<(), ()> {
    match ctrl {
        ControlMessage::Resize { cols, rows } => {
            if let Err(err) = broker.resize_session(session, cols, rows).await {
                debug!(session_id = %session.id, error = %err, "resize failed");
            }
            Ok(())
        }
        ControlMessage::Ping {} => send_json(ws_tx, &ServerFrame::Pong {}).await,
    }
}

async fn send_json(tx: &mut SplitSink<WebSocket, Message>, msg: &ServerFrame) -> Result<(), ()> {
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn close(tx: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) -> Result<(), ()> {
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    tx.send(Message::Close(Some(frame))).await.map_err(|_| ())
}
