// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-to-shell terminal broker. Accepts authenticated WebSocket
//! connections, provisions one sandboxed container per session, and
//! bridges their shell's stdio to the client, with grace-period resume
//! across reconnects.

pub mod acceptor;
pub mod admission;
pub mod broker;
pub mod config;
pub mod container;
pub mod credential;
pub mod error;
pub mod metrics;
pub mod orphan;
pub mod protocol;
pub mod pump;
pub mod registry;
pub mod ring;
pub mod run;
pub mod session;
pub mod shutdown;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broker::Broker;

/// Build the main router: `/ws` for terminal sessions, `/healthz` for
/// process-level liveness and the ambient counters.
pub fn build_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/ws", get(acceptor::ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(broker)
}

async fn healthz(State(broker): State<Arc<Broker>>) -> impl IntoResponse {
    Json(broker.metrics.snapshot())
}
