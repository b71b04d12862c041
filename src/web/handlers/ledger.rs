use std::collections::BTreeMap;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::{services::ledger::LedgerQuery, utils::state::AppState, web::error::ApiError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSearchRequest {
    pub issuer_id: String,
    pub credential_type: String,
    #[serde(default)]
    pub credential_id: Option<String>,
    #[serde(default)]
    pub indexed_attributes: BTreeMap<String, String>,
}

pub async fn search_ledger(
    State(state): State<AppState>,
    Json(payload): Json<LedgerSearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.issuer_id.trim().is_empty() || payload.credential_type.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "issuerId and credentialType are required".to_string(),
        ));
    }

    let query = LedgerQuery::new()
        .issuer(&payload.issuer_id)
        .credential_type(&payload.credential_type)
        .credential_id(payload.credential_id.as_deref().unwrap_or_default())
        .attributes(
            payload
                .indexed_attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

    let entries = state.ledger.search(&query).await?;
    tracing::debug!("Ledger search matched {} entries", entries.len());
    Ok(Json(entries))
}
