use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{utils::state::AppState, web::error::ApiError};

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Exclusive lower bound, RFC 3339.
    pub since: Option<DateTime<Utc>>,
    /// Id of the last entry seen at `since`.
    pub after_id: Option<i64>,
}

/// Replication feed of status changes.
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let since = query.since.unwrap_or(DateTime::UNIX_EPOCH);
    let entries = state
        .statuses
        .transactions_since(since, query.after_id)
        .await?;
    Ok(Json(entries))
}
