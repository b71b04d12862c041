//! Bitstring status list credential documents.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::models::{StatusBinding, StatusListPage};

pub const VC_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";
pub const STATUS_LIST_CREDENTIAL_TYPE: &str = "BitstringStatusListCredential";
pub const STATUS_LIST_TYPE: &str = "BitstringStatusList";
pub const STATUS_LIST_ENTRY_TYPE: &str = "BitstringStatusListEntry";

/// Signs a status list document before it is stored.
///
/// The proof suite is chosen by the implementation.
#[async_trait]
pub trait DocumentSigner: Send + Sync {
    async fn sign(&self, document: Value) -> Result<Value, String>;
}

/// Stores documents without a proof.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsignedDocuments;

#[async_trait]
impl DocumentSigner for UnsignedDocuments {
    async fn sign(&self, document: Value) -> Result<Value, String> {
        Ok(document)
    }
}

/// Public URL of a page.
pub fn page_url(domain: &str, page_id: &str) -> String {
    let domain = domain.trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        format!("{domain}/statuslists/{page_id}")
    } else {
        format!("https://{domain}/statuslists/{page_id}")
    }
}

/// Builds the unsigned credential wrapping a page's encoded list.
pub fn build_document(
    page: &StatusListPage,
    encoded_list: &str,
    issuer_id: &str,
    page_url: &str,
) -> Value {
    json!({
        "@context": [VC_CONTEXT],
        "type": ["VerifiableCredential", STATUS_LIST_CREDENTIAL_TYPE],
        "id": page_url,
        "issuer": issuer_id,
        "validFrom": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "credentialSubject": {
            "id": page_url,
            "type": STATUS_LIST_TYPE,
            "statusPurpose": page.status_purpose.as_str(),
            "encodedList": encoded_list,
        },
    })
}

/// Reads `credentialSubject.encodedList` from a stored document.
pub fn encoded_list(document: &str) -> Option<String> {
    let value: Value = serde_json::from_str(document).ok()?;
    value
        .pointer("/credentialSubject/encodedList")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// The `credentialStatus` claim embedded in an issued credential.
pub fn status_entry(binding: &StatusBinding, page_url: &str) -> Value {
    json!({
        "id": format!("{page_url}#{}", binding.index),
        "type": STATUS_LIST_ENTRY_TYPE,
        "statusPurpose": binding.purpose.as_str(),
        "statusListIndex": binding.index.to_string(),
        "statusListCredential": page_url,
    })
}
