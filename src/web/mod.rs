//! Dashboard HTTP surface.
//!
//! `GET /` serves a single page that loads `/api/options`, then asks
//! `/api/report` for the default view and window and again on every
//! selector change. Everything except `/health` sits behind Basic auth.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::analytics::ReportSource;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub source: Arc<dyn ReportSource>,
    pub credentials: Arc<(String, String)>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        source: Arc<dyn ReportSource>,
        credentials: (String, String),
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            source,
            credentials: Arc::new(credentials),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(handlers::index))
        .route("/api/options", get(handlers::options))
        .route("/api/report", get(handlers::report))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
