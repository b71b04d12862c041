use thiserror::Error;

use crate::{database::error::RepositoryError, models::StatusPurpose, utils::errors::CodecError};

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("no slot could be allocated for {purpose} credentials of type {credential_type}")]
    AllocationExhausted {
        purpose: StatusPurpose,
        credential_type: String,
    },
    #[error("no {purpose} status found for credential {credential_id}")]
    CredentialNotFound {
        credential_id: String,
        purpose: StatusPurpose,
    },
    #[error("credential {0} is not in the ledger")]
    LedgerEntryNotFound(String),
    #[error("status list page {0} not found")]
    PageNotFound(String),
    #[error("status list page {page_id} has an invalid encoded list: {source}")]
    Codec {
        page_id: String,
        #[source]
        source: CodecError,
    },
    #[error("credential {0} already exists")]
    DuplicateCredential(String),
    #[error("credential {credential_id} already has a {purpose} binding")]
    DuplicateBinding {
        credential_id: String,
        purpose: StatusPurpose,
    },
    #[error("status list page {0} kept changing while its document was regenerated")]
    RefreshConflict(String),
    #[error("capacity {0} is not a positive multiple of 8")]
    InvalidCapacity(u64),
    #[error("failed to sign status list document: {0}")]
    Signing(String),
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
}

impl StatusError {
    pub(crate) fn codec(page_id: &str, source: CodecError) -> Self {
        StatusError::Codec {
            page_id: page_id.to_owned(),
            source,
        }
    }
}
