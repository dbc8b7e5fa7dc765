//! Dashboard — Axum JSON API over the race engine.
//!
//! Exposes the race status snapshot, the open race, race history, the
//! roster, wager placement, user lookups and the admin force-advance.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Header carrying the admin token on `/admin/*` requests.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Bind the API port and serve in a background task.
///
/// The server drains and stops once `shutdown` carries `true`.
pub async fn spawn_dashboard(
    state: AppState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    let handle = tokio::spawn(async move {
        let stop = async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
            error!(error = %e, "Dashboard server error");
        }
        info!("Dashboard server stopped");
    });

    Ok(handle)
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(ADMIN_TOKEN_HEADER)]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/race/status", get(routes::get_race_status))
        .route("/api/race/active", get(routes::get_active_race))
        .route("/api/races", get(routes::get_races))
        .route("/api/competitors", get(routes::get_competitors))
        .route("/api/payout-preview", get(routes::get_payout_preview))
        .route("/api/wagers", post(routes::place_wager))
        .route("/api/users/:id", get(routes::get_user))
        .route("/api/users/:id/wagers", get(routes::get_user_wagers))
        .route("/admin/advance", post(routes::force_advance))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
