//! HTTP routes

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::connection::ConnectionId;
use crate::relay::RelayDispatcher;
use crate::shutdown::ShutdownCoordinator;
use super::socket::handle_socket;

/// Page served at `/` when no `index_page` is configured
pub const DEFAULT_PAGE: &str = include_str!("../../static/index.html");

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: RelayDispatcher,
    pub page: Arc<str>,
    pub shutdown: ShutdownCoordinator,
    /// Payloads queued per connection before broadcasts skip it
    pub outbound_capacity: usize,
}

/// Open connection listing
#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub ids: Vec<String>,
}

/// Build the router serving the page, the relay endpoint and the probes
pub fn create_router(state: AppState, metrics_enabled: bool) -> Router {
    let mut router: Router<AppState> = Router::new()
        // page and relay share the root path
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/connections", get(list_connections));

    if metrics_enabled {
        router = router.route("/metrics", get(export_metrics));
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

/// Upgrade WebSocket requests to relay connections, serve the page otherwise
async fn root(
    ws: Option<WebSocketUpgrade>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Some(ws) => {
            let id = ConnectionId::from_peer(peer);
            debug!(connection_id = %id, "WebSocket upgrade requested");
            ws.on_failed_upgrade(move |e| {
                warn!(peer = %peer, error = %e, "WebSocket upgrade failed");
            })
            .on_upgrade(move |socket| handle_socket(socket, id, state))
        }
        None => Html(state.page.to_string()).into_response(),
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_connections(State(state): State<AppState>) -> Json<ConnectionsResponse> {
    let ids: Vec<String> = state
        .dispatcher
        .registry()
        .ids()
        .iter()
        .map(|id| id.to_string())
        .collect();

    Json(ConnectionsResponse {
        count: ids.len(),
        ids,
    })
}

async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.dispatcher.metrics().export_prometheus(),
    )
}
