use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    indexed_days: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_in_flight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl HealthReport {
    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            indexed_days: None,
            refresh_in_flight: None,
            detail: Some(detail.into()),
        }
    }
}

/// Ready while the cache directory is reachable; an empty cache is still
/// servable.
pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    let dir = state.store().dir();
    if let Err(error) = tokio::fs::metadata(dir).await {
        error!(%error, dir = %dir.display(), "cache directory unavailable");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded(format!("cache directory: {error}"))),
        ));
    }

    let index = state.store().index_snapshot().await;
    Ok(Json(HealthReport {
        status: "ready",
        indexed_days: Some(index.len()),
        refresh_in_flight: Some(state.coordinator().is_running()),
        detail: None,
    }))
}

pub(crate) async fn live() -> Json<HealthReport> {
    debug!("service live probe");
    Json(HealthReport {
        status: "live",
        indexed_days: None,
        refresh_in_flight: None,
        detail: None,
    })
}
