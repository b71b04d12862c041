use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    models::{StatusPurpose, TransactionEntry},
    services::error::StatusError,
    utils::state::AppState,
    web::error::ApiError,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub credential_id: String,
    pub purpose: String,
    pub status: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusResponse {
    pub credential_id: String,
    pub purpose: StatusPurpose,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionEntry>,
}

fn parse_purpose(purpose: &str) -> Result<StatusPurpose, ApiError> {
    purpose.parse().map_err(ApiError::BadRequest)
}

/// Revokes, suspends or reinstates a credential.
pub async fn update_status(
    State(state): State<AppState>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.credential_id.trim().is_empty() {
        return Err(ApiError::BadRequest("credentialId is required".to_string()));
    }
    let purpose = parse_purpose(&payload.purpose)?;

    let transaction = state
        .statuses
        .set_status(&payload.credential_id, purpose, payload.status)
        .await?;

    Ok(Json(CredentialStatusResponse {
        credential_id: payload.credential_id,
        purpose,
        status: payload.status,
        transaction,
    }))
}

pub async fn get_credential(
    State(state): State<AppState>,
    Path(credential_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .ledger
        .find_by_credential_id(&credential_id)
        .await?
        .ok_or_else(|| StatusError::LedgerEntryNotFound(credential_id.clone()))?;
    Ok(Json(entry))
}

pub async fn get_credential_status(
    State(state): State<AppState>,
    Path((credential_id, purpose)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let purpose = parse_purpose(&purpose)?;
    let status = state.statuses.get_status(&credential_id, purpose).await?;

    Ok(Json(CredentialStatusResponse {
        credential_id,
        purpose,
        status,
        transaction: None,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    use crate::{
        services::ledger::NewIssuance,
        startup::app,
        test_utils::{test_app_state, MemoryStore},
        utils::{codec, document},
        web::handlers::test_support::body_json,
    };

    use super::*;

    async fn issue(state: &AppState, credential_id: &str) -> crate::models::StatusBinding {
        let reservation = state
            .issuance
            .reserve("VerifiableCredential", &[StatusPurpose::Revocation])
            .await
            .unwrap();
        let binding = reservation.bindings[0].clone();
        state
            .issuance
            .commit(
                reservation,
                NewIssuance {
                    credential_id: credential_id.to_string(),
                    issuer_id: "did:web:example.com".to_string(),
                    credential_type: "VerifiableCredential".to_string(),
                    issue_date: chrono::Utc::now(),
                    expiration_date: None,
                    indexed_attributes: Default::default(),
                },
            )
            .await
            .unwrap();
        binding
    }

    fn post_status(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/credentials/status")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_revoke_publishes_bit() {
        let state = test_app_state(Arc::new(MemoryStore::default()));
        let binding = issue(&state, "cred-1").await;

        let response = app(state.clone())
            .oneshot(post_status(json!({
                "credentialId": "cred-1",
                "purpose": "revocation",
                "status": true,
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], true);
        assert_eq!(body["transaction"]["slot_index"], binding.index);

        let published = state.pages.document(&binding.page_id).await.unwrap();
        let encoded = document::encoded_list(&published).unwrap();
        let bits = codec::decode(&encoded, 16).unwrap();
        assert!(bits[binding.index as usize]);

        // Repeating the request changes nothing
        let response = app(state)
            .oneshot(post_status(json!({
                "credentialId": "cred-1",
                "purpose": "revocation",
                "status": true,
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.get("transaction").is_none());
    }

    #[tokio::test]
    async fn test_update_status_errors() {
        let state = test_app_state(Arc::new(MemoryStore::default()));

        let response = app(state.clone())
            .oneshot(post_status(json!({
                "credentialId": "unknown",
                "purpose": "revocation",
                "status": true,
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(state)
            .oneshot(post_status(json!({
                "credentialId": "cred-1",
                "purpose": "refresh",
                "status": true,
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_credential_and_status() {
        let state = test_app_state(Arc::new(MemoryStore::default()));
        issue(&state, "cred-1").await;

        let response = get_credential_status(
            State(state.clone()),
            Path(("cred-1".to_string(), "Revocation".to_string())),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], false);

        let response = get_credential(State(state.clone()), Path("cred-1".to_string()))
            .await
            .unwrap()
            .into_response();
        let entry = body_json(response).await;
        assert_eq!(entry["status_bindings"][0]["purpose"], "revocation");

        let result = get_credential(State(state), Path("cred-2".to_string())).await;
        assert!(matches!(
            result,
            Err(ApiError::Status(StatusError::LedgerEntryNotFound(_)))
        ));
    }
}
