use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use gqlws_core::protocol::GRAPHQL_WS_PROTOCOL;
use gqlws_core::Authenticator;
use gqlws_subscriptions::SubscriptionManager;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::ConnectionConfig;
use crate::handler::SubscriptionHandler;
use crate::transport::split_websocket;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Route serving WebSocket upgrades.
    pub path: String,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8085,
            path: "/subscriptions".to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<SubscriptionHandler>,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub connection: ConnectionConfig,
}

/// Build the Axum router with the upgrade and health routes.
pub fn build_router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and start serving. Returns a handle that stops the server.
pub async fn start(
    config: ServerConfig,
    manager: Arc<SubscriptionManager>,
    authenticator: Option<Arc<dyn Authenticator>>,
) -> Result<ServerHandle, std::io::Error> {
    let handler = Arc::new(SubscriptionHandler::new(manager));

    let state = AppState {
        handler: Arc::clone(&handler),
        authenticator,
        connection: config.connection.clone(),
    };

    let router = build_router(state, &config.path);
    let listener = tokio::net::TcpListener::bind(SocketAddr::new(config.bind_address, config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), path = %config.path, "GraphQL WS server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(err = %err, "Server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        handler,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    pub handler: Arc<SubscriptionHandler>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for the listener to wind down.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.server.await;
    }
}

/// WebSocket upgrade handler. Only `graphql-ws` is offered.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols([GRAPHQL_WS_PROTOCOL])
        .max_message_size(state.connection.read_limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let protocol = socket.protocol().and_then(|p| p.to_str().ok());
    if protocol != Some(GRAPHQL_WS_PROTOCOL) {
        tracing::warn!(protocol = ?protocol, "Connection does not implement the graphql-ws protocol");
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let (sink, stream) = split_websocket(socket);
    let handle = state
        .handler
        .accept(sink, stream, state.connection.clone(), state.authenticator.clone());
    handle.join().await;
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    connections: usize,
    subscriptions: usize,
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(HealthStatus {
        status: "healthy",
        connections: state.handler.connection_count(),
        subscriptions: state.handler.manager().count(),
    })
}
