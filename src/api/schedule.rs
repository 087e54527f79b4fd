use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::app::AppState;
use crate::domain::CacheRecordView;
use crate::reader::WindowView;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: String,
}

pub(crate) async fn get_date(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<CacheRecordView>, (StatusCode, Json<ErrorBody>)> {
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: format!("expected a date as YYYY-MM-DD, got {raw:?}"),
            }),
        )
    })?;
    Ok(Json(state.reader().get_for_date(date).await))
}

pub(crate) async fn get_days(State(state): State<AppState>) -> Json<WindowView> {
    Json(state.reader().get_window(state.now()).await)
}

pub(crate) async fn get_current(State(state): State<AppState>) -> Json<CacheRecordView> {
    Json(state.reader().get_current(state.now()).await)
}
