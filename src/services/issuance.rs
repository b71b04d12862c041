use std::sync::Arc;

use serde_json::Value;

use crate::{
    database::{error::RepositoryError, repository::StatusRepository},
    models::{LedgerEntry, NewStatusRecord, StatusBinding, StatusPurpose},
    utils::document,
};

use super::{
    error::StatusError,
    ledger::{IssuanceLedger, NewIssuance},
    pages::PageManager,
};

/// Slots held for a credential that is not signed yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub credential_type: String,
    pub bindings: Vec<StatusBinding>,
}

/// Ties slot allocation, status records and the ledger together
/// for the issuance pipeline.
pub struct IssuanceService {
    pages: Arc<PageManager>,
    statuses: Arc<dyn StatusRepository>,
    ledger: Arc<IssuanceLedger>,
    default_purposes: Vec<StatusPurpose>,
}

impl IssuanceService {
    pub fn new(
        pages: Arc<PageManager>,
        statuses: Arc<dyn StatusRepository>,
        ledger: Arc<IssuanceLedger>,
        default_purposes: Vec<StatusPurpose>,
    ) -> Self {
        Self {
            pages,
            statuses,
            ledger,
            default_purposes,
        }
    }

    pub fn default_purposes(&self) -> &[StatusPurpose] {
        &self.default_purposes
    }

    /// Reserves the configured default purposes.
    pub async fn reserve_default(&self, credential_type: &str) -> Result<Reservation, StatusError> {
        self.reserve(credential_type, &self.default_purposes).await
    }

    /// Acquires one slot per distinct purpose.
    pub async fn reserve(
        &self,
        credential_type: &str,
        purposes: &[StatusPurpose],
    ) -> Result<Reservation, StatusError> {
        let mut reservation = Reservation {
            credential_type: credential_type.to_owned(),
            bindings: Vec::with_capacity(purposes.len()),
        };

        for &purpose in purposes {
            if reservation.bindings.iter().any(|b| b.purpose == purpose) {
                continue;
            }
            match self.pages.acquire_slot(purpose, credential_type).await {
                Ok(binding) => reservation.bindings.push(binding),
                Err(e) => {
                    self.release_all(&reservation.bindings).await;
                    return Err(e);
                }
            }
        }
        Ok(reservation)
    }

    /// `credentialStatus` claims to embed before signing.
    pub fn status_entries(&self, reservation: &Reservation) -> Vec<Value> {
        reservation
            .bindings
            .iter()
            .map(|binding| document::status_entry(binding, &self.pages.page_url(&binding.page_id)))
            .collect()
    }

    /// Persists a signed credential: one status record per binding, then the ledger entry.
    pub async fn commit(
        &self,
        reservation: Reservation,
        issuance: NewIssuance,
    ) -> Result<LedgerEntry, StatusError> {
        let credential_id = issuance.credential_id.clone();
        let mut inserted = Vec::with_capacity(reservation.bindings.len());

        for binding in &reservation.bindings {
            let record = NewStatusRecord {
                credential_id: credential_id.clone(),
                binding: binding.clone(),
            };
            if let Err(e) = self.statuses.insert(record).await {
                self.rollback(&credential_id, &inserted, &reservation.bindings)
                    .await;
                return Err(match e {
                    RepositoryError::Duplicate => StatusError::DuplicateCredential(credential_id),
                    other => other.into(),
                });
            }
            inserted.push(binding.purpose);
        }

        match self.ledger.record(issuance, reservation.bindings.clone()).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.rollback(&credential_id, &inserted, &reservation.bindings)
                    .await;
                Err(e)
            }
        }
    }

    /// Gives the reserved slots back.
    ///
    /// Slots already owned by a ledger entry stay assigned, so aborting a
    /// reservation that was committed is harmless.
    pub async fn abort(&self, reservation: Reservation) {
        self.release_all(&reservation.bindings).await;
    }

    /// Binds an issued credential to an additional purpose.
    pub async fn add_purpose(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<StatusBinding, StatusError> {
        let entry = self
            .ledger
            .find_by_credential_id(credential_id)
            .await?
            .ok_or_else(|| StatusError::LedgerEntryNotFound(credential_id.to_owned()))?;
        let duplicate = || StatusError::DuplicateBinding {
            credential_id: credential_id.to_owned(),
            purpose,
        };
        if entry.status_bindings.for_purpose(purpose).is_some() {
            return Err(duplicate());
        }

        let binding = self
            .pages
            .acquire_slot(purpose, &entry.credential_type)
            .await?;
        let record = NewStatusRecord {
            credential_id: credential_id.to_owned(),
            binding: binding.clone(),
        };
        if let Err(e) = self.statuses.insert(record).await {
            self.release_all(std::slice::from_ref(&binding)).await;
            return Err(match e {
                RepositoryError::Duplicate => duplicate(),
                other => other.into(),
            });
        }

        if let Err(e) = self.ledger.add_binding(credential_id, binding.clone()).await {
            self.rollback(credential_id, &[purpose], std::slice::from_ref(&binding))
                .await;
            return Err(e);
        }
        tracing::info!("Bound credential {credential_id} to a {purpose} status list");
        Ok(binding)
    }

    async fn rollback(
        &self,
        credential_id: &str,
        inserted: &[StatusPurpose],
        bindings: &[StatusBinding],
    ) {
        for &purpose in inserted {
            if let Err(e) = self.statuses.delete(credential_id, purpose).await {
                tracing::error!("Failed to remove {purpose} status of {credential_id}: {e}");
            }
        }
        self.release_all(bindings).await;
    }

    async fn release_all(&self, bindings: &[StatusBinding]) {
        for binding in bindings {
            match self
                .ledger
                .find_by_binding(&binding.page_id, binding.index)
                .await
            {
                Ok(None) => {}
                Ok(Some(owner)) => {
                    tracing::warn!(
                        "Index {} of page {} belongs to credential {}; not releasing",
                        binding.index,
                        binding.page_id,
                        owner.credential_id
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to look up the owner of index {} of page {}: {e}",
                        binding.index,
                        binding.page_id
                    );
                    continue;
                }
            }
            if let Err(e) = self.pages.release(&binding.page_id, binding.index).await {
                tracing::error!(
                    "Failed to release index {} of page {}: {e}",
                    binding.index,
                    binding.page_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::repository::SlotRepository,
        test_utils::{page_manager, MemoryStore},
    };
    use chrono::Utc;

    const TYPE: &str = "DrivingLicense";

    fn service(store: &Arc<MemoryStore>) -> IssuanceService {
        IssuanceService::new(
            Arc::new(page_manager(store.clone(), 16)),
            store.clone(),
            Arc::new(IssuanceLedger::new(store.clone())),
            vec![StatusPurpose::Revocation, StatusPurpose::Suspension],
        )
    }

    fn issuance(credential_id: &str) -> NewIssuance {
        NewIssuance {
            credential_id: credential_id.to_string(),
            issuer_id: "did:web:issuer".to_string(),
            credential_type: TYPE.to_string(),
            issue_date: Utc::now(),
            expiration_date: None,
            indexed_attributes: Default::default(),
        }
    }

    async fn assigned(store: &MemoryStore, binding: &StatusBinding) -> bool {
        store
            .assigned_indices(&binding.page_id)
            .await
            .unwrap()
            .contains(&binding.index)
    }

    #[tokio::test]
    async fn test_reserve_and_commit() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let reservation = issuance_service
            .reserve(
                TYPE,
                &[
                    StatusPurpose::Revocation,
                    StatusPurpose::Suspension,
                    StatusPurpose::Revocation,
                ],
            )
            .await
            .unwrap();
        assert_eq!(reservation.bindings.len(), 2);

        let entries = issuance_service.status_entries(&reservation);
        assert_eq!(entries[0]["statusPurpose"], "revocation");
        assert_eq!(entries[1]["statusPurpose"], "suspension");

        let entry = issuance_service
            .commit(reservation.clone(), issuance("cred-1"))
            .await
            .unwrap();
        assert_eq!(entry.status_bindings.0, reservation.bindings);
        assert!(StatusRepository::find(store.as_ref(), "cred-1", StatusPurpose::Suspension)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_commit_duplicate_releases_slots() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let first = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        issuance_service
            .commit(first, issuance("cred-1"))
            .await
            .unwrap();

        let second = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        let binding = second.bindings[0].clone();
        let result = issuance_service.commit(second, issuance("cred-1")).await;

        assert!(matches!(result, Err(StatusError::DuplicateCredential(_))));
        assert!(!assigned(&store, &binding).await);
        // The original record is untouched
        let original = StatusRepository::find(store.as_ref(), "cred-1", StatusPurpose::Revocation)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(original.slot_index, binding.index);
    }

    #[tokio::test]
    async fn test_abort_releases_slots() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let reservation = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        let binding = reservation.bindings[0].clone();
        assert!(assigned(&store, &binding).await);

        issuance_service.abort(reservation).await;
        assert!(!assigned(&store, &binding).await);
    }

    #[tokio::test]
    async fn test_abort_after_commit_keeps_slots() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let reservation = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        let binding = reservation.bindings[0].clone();
        issuance_service
            .commit(reservation.clone(), issuance("cred-1"))
            .await
            .unwrap();

        issuance_service.abort(reservation).await;
        assert!(assigned(&store, &binding).await);

        let next = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        assert_ne!(next.bindings[0], binding);
    }

    #[tokio::test]
    async fn test_reserve_default_purposes() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let reservation = issuance_service.reserve_default(TYPE).await.unwrap();
        let purposes: Vec<_> = reservation.bindings.iter().map(|b| b.purpose).collect();
        assert_eq!(purposes, issuance_service.default_purposes());
    }

    #[tokio::test]
    async fn test_add_purpose_after_issuance() {
        let store = Arc::new(MemoryStore::default());
        let issuance_service = service(&store);

        let reservation = issuance_service
            .reserve(TYPE, &[StatusPurpose::Revocation])
            .await
            .unwrap();
        issuance_service
            .commit(reservation, issuance("cred-1"))
            .await
            .unwrap();

        let binding = issuance_service
            .add_purpose("cred-1", StatusPurpose::Suspension)
            .await
            .unwrap();
        assert_eq!(binding.purpose, StatusPurpose::Suspension);

        let entry = issuance_service
            .ledger
            .find_by_credential_id("cred-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status_bindings.0.len(), 2);

        assert!(matches!(
            issuance_service
                .add_purpose("cred-1", StatusPurpose::Suspension)
                .await,
            Err(StatusError::DuplicateBinding { .. })
        ));
        assert!(matches!(
            issuance_service
                .add_purpose("unknown", StatusPurpose::Suspension)
                .await,
            Err(StatusError::LedgerEntryNotFound(_))
        ));
    }
}
