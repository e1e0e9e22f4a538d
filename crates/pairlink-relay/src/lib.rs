//! Pairlink signaling relay.
//!
//! Pairs two WebSocket clients that present tokens for the same pairing, one
//! per role, exchanges their session nonces and then forwards signaling
//! frames between them without inspecting their payloads.

#![forbid(unsafe_code)]

pub mod classifier;
pub mod config;
pub mod server;
pub mod signal;
pub mod validator;

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use server::{Connection, ConnectionId, PairingStatus, RelayServer};
pub use signal::TransportLimits;
pub use validator::{HttpTokenValidator, StaticTokenValidator, TokenValidator};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayServer>,
    pub limits: TransportLimits,
}

impl AppState {
    pub fn new(relay: Arc<RelayServer>, limits: TransportLimits) -> Self {
        Self { relay, limits }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    pairings: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(Health {
        status: "ok",
        connections: state.relay.connection_count().await,
        pairings: state.relay.pairing_count().await,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Pairlink Relay Online" }))
        .route("/health", get(health))
        .route("/ws", get(signal::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
