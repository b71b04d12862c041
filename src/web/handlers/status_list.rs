use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{utils::state::AppState, web::error::ApiError};

const VC_MEDIA_TYPE: &str = "application/vc+ld+json";

/// Serves the published document of a page.
pub async fn get_status_list(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.pages.document(&page_id).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, VC_MEDIA_TYPE)], document))
}

pub async fn get_page_stats(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pages.stats(&page_id).await?))
}

/// Ledger entry owning a bit of a page.
pub async fn get_slot_owner(
    State(state): State<AppState>,
    Path((page_id, index)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .ledger
        .find_by_binding(&page_id, index)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No credential owns index {index} of {page_id}"))
        })?;
    Ok(Json(entry))
}
