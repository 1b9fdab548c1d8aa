//! Axum-based RPC server.

use crate::error::RpcError;
use crate::handlers::{self, AppState};
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Header carrying the authenticated caller id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build the API router over a shared engine.
pub fn router(engine: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
        ]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route(
            "/issues",
            get(handlers::list_issues).post(handlers::create_issue),
        )
        .route("/issues/:id", get(handlers::get_issue))
        .route(
            "/issues/:id/votes",
            get(handlers::list_votes).post(handlers::cast_vote),
        )
        .route("/issues/:id/audit", get(handlers::audit_tally))
        .route("/issues/:id/status", post(handlers::advance_status))
        .layer(cors)
        .with_state(engine)
}

pub struct RpcServer {
    pub port: u16,
    engine: AppState,
}

impl RpcServer {
    pub fn new(port: u16, engine: AppState) -> Self {
        Self { port, engine }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), RpcError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        info!(%addr, "RPC server listening");
        axum::serve(listener, router(self.engine))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
