use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    database::error::RepositoryError,
    models::{
        LedgerEntry, NewStatusRecord, PageState, SlotStats, StatusBinding, StatusChange,
        StatusListPage, StatusPurpose, StatusRecord, TransactionEntry,
    },
    services::ledger::LedgerQuery,
};

/// Storage for status list pages.
#[async_trait]
pub trait PageRepository: Send + Sync {
    /// Inserts the page together with `capacity` unassigned slots.
    async fn create_page(&self, page: StatusListPage) -> Result<StatusListPage, RepositoryError>;
    async fn find_page(&self, id: &str) -> Result<Option<StatusListPage>, RepositoryError>;
    /// Most recently created `AVAILABLE` page of a lane.
    async fn find_latest_available(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<Option<StatusListPage>, RepositoryError>;
    /// Conditionally moves a page from `from` to `to`, returning whether the row changed.
    async fn transition(
        &self,
        id: &str,
        from: PageState,
        to: PageState,
    ) -> Result<bool, RepositoryError>;
    /// Stores a document only if the page is still at `expected_version`.
    ///
    /// Returns whether the write took effect; a successful write bumps the version.
    async fn update_document(
        &self,
        id: &str,
        expected_version: i64,
        document: String,
    ) -> Result<bool, RepositoryError>;
    async fn page_ids(&self) -> Result<Vec<String>, RepositoryError>;
}

/// Per-page slot table.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn first_free(&self, page_id: &str) -> Result<Option<i64>, RepositoryError>;
    /// Sets `assigned` only if currently unassigned.
    async fn assign(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError>;
    /// Assigns every currently free index of `indices`, returning how many took effect.
    async fn assign_many(&self, page_id: &str, indices: &[i64]) -> Result<u64, RepositoryError>;
    async fn release(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError>;
    async fn stats(&self, page_id: &str) -> Result<SlotStats, RepositoryError>;
    async fn assigned_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError>;
}

/// Status records and the transaction log they write to.
#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn insert(&self, record: NewStatusRecord) -> Result<StatusRecord, RepositoryError>;
    async fn delete(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<bool, RepositoryError>;
    async fn find(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<Option<StatusRecord>, RepositoryError>;
    /// Under an exclusive row lock, sets the value and appends a log entry if it differs.
    async fn compare_and_set(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
        value: bool,
    ) -> Result<StatusChange, RepositoryError>;
    /// Indices of a page whose status value is `true`.
    async fn flagged_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError>;
    /// Entries after the cursor in `(created_at, id)` order.
    ///
    /// Without `after_id` every entry at exactly `since` is excluded.
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
        after_id: Option<i64>,
        limit: u64,
    ) -> Result<Vec<TransactionEntry>, RepositoryError>;
}

/// Issuance ledger.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn insert(&self, entry: LedgerEntry) -> Result<LedgerEntry, RepositoryError>;
    async fn find(&self, credential_id: &str) -> Result<Option<LedgerEntry>, RepositoryError>;
    /// Appends a binding under lock; `Duplicate` if the purpose is already bound.
    async fn append_binding(
        &self,
        credential_id: &str,
        binding: StatusBinding,
    ) -> Result<LedgerEntry, RepositoryError>;
    async fn search(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, RepositoryError>;
    async fn find_by_binding(
        &self,
        page_id: &str,
        index: i64,
    ) -> Result<Option<LedgerEntry>, RepositoryError>;
}
