pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod schedule;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/api/date/{date}", get(schedule::get_date))
        .route("/api/days", get(schedule::get_days))
        .route("/api/data", get(schedule::get_current))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
