//! Read-only access to gallery records for the site front end.

use crate::{errors::AppError, models::gallery::GalleryRecord, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub limit: Option<usize>,
}

/// `GET /gallery?limit=N` — newest records first.
pub async fn list_gallery(
    State(state): State<AppState>,
    Query(q): Query<GalleryQuery>,
) -> Result<Json<Vec<GalleryRecord>>, AppError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.gallery.list(limit).await?;
    Ok(Json(records))
}
