use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use sitesmith_agent::SiteService;

use crate::routes;
use crate::state::AppState;
use crate::static_files;

/// HTTP + SSE gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(service: Arc<SiteService>) -> Self {
        Self {
            state: AppState::new(service),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/tools", get(routes::tools))
            .route("/sse", get(routes::sse_open).post(routes::sse_post))
            .route("/sites/{site_id}", get(routes::serve_site))
            .route("/sites/{site_id}/{*path}", get(routes::serve_site_file))
            .route("/", get(static_files::index))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let bind = self.state.config.gateway.bind.clone();
        let app = self.router();

        let listener = TcpListener::bind(&bind).await?;
        info!(bind = %bind, public_url = %self.state.config.gateway.public_url, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!(live_sessions = self.state.registry.live_count(), "Gateway shut down");
        Ok(())
    }
}
