//! Read-mostly HTTP plus a push channel dashboard (§6, §10.5).
//!
//! Grounded on `betterbot-backend`'s `main.rs` router assembly (`Router::new()
//! .route(...).with_state(...)`, `CorsLayer`, `TraceLayer`) and `api/routes.rs`
//! handler style.

pub mod routes;
pub mod state;

pub use state::AppState;

use crate::config::DashboardConfig;
use crate::orchestrator::Orchestrator;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState, enable_controls: bool) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/pairs/:symbol", get(routes::get_pair))
        .route("/ws/status", get(routes::ws_status));

    if enable_controls {
        app = app
            .route("/api/control/halt", post(routes::post_halt))
            .route("/api/control/resume", post(routes::post_resume));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawns the ~2s snapshot broadcaster and serves the router until the
/// process is killed. The orchestrator's own `SNAPSHOT_INTERVAL` governs
/// durable journal snapshots (§4.10); this ticker is independent and only
/// feeds live dashboard subscribers (§10.5).
pub async fn serve(orchestrator: Arc<Orchestrator>, config: DashboardConfig) -> anyhow::Result<()> {
    let state = AppState::new(orchestrator);
    let ticker_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            interval.tick().await;
            ticker_state.publish_snapshot().await;
        }
    });

    let app = router(state, config.enable_controls);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    log::info!("dashboard_listening addr={addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
