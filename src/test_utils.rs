use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    database::{
        error::RepositoryError,
        repository::{LedgerRepository, PageRepository, SlotRepository, StatusRepository},
    },
    models::{
        LedgerEntry, NewStatusRecord, PageState, SlotStats, StatusBinding, StatusChange,
        StatusListPage, StatusPurpose, StatusRecord, TransactionEntry,
    },
    services::{
        ledger::LedgerQuery,
        pages::{PageManager, PageSettings},
        slots::SlotTable,
    },
    utils::{cache::Cache, document::UnsignedDocuments, state::AppState},
};

#[derive(Default)]
struct Tables {
    pages: HashMap<String, StatusListPage>,
    // creation order of page ids
    page_order: Vec<String>,
    slots: HashMap<String, BTreeMap<i64, bool>>,
    statuses: HashMap<(String, StatusPurpose), StatusRecord>,
    transactions: Vec<TransactionEntry>,
    ledger: Vec<LedgerEntry>,
}

/// In-memory store implementing every repository.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn page_count(&self) -> usize {
        self.tables.read().unwrap().pages.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.tables.read().unwrap().transactions.len()
    }

    /// Rewrites every log entry to the same timestamp.
    pub fn pin_transaction_times(&self, at: DateTime<Utc>) {
        let mut tables = self.tables.write().unwrap();
        for entry in tables.transactions.iter_mut() {
            entry.created_at = at;
        }
    }

    /// Sets the status behind a slot directly, creating a record if needed.
    pub fn mark_status(&self, page_id: &str, index: i64, value: bool) {
        let mut tables = self.tables.write().unwrap();
        let key = (format!("slot-{page_id}-{index}"), StatusPurpose::Revocation);
        tables
            .statuses
            .entry(key.clone())
            .or_insert_with(|| StatusRecord {
                credential_id: key.0.clone(),
                status_purpose: key.1,
                page_id: page_id.to_string(),
                slot_index: index,
                status_value: false,
                created_at: Utc::now(),
                updated_at: None,
            })
            .status_value = value;
    }
}

#[async_trait]
impl PageRepository for MemoryStore {
    async fn create_page(&self, page: StatusListPage) -> Result<StatusListPage, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        if tables.pages.contains_key(&page.id) {
            return Err(RepositoryError::Duplicate);
        }
        tables
            .slots
            .insert(page.id.clone(), (0..page.capacity).map(|i| (i, false)).collect());
        tables.page_order.push(page.id.clone());
        tables.pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn find_page(&self, id: &str) -> Result<Option<StatusListPage>, RepositoryError> {
        Ok(self.tables.read().unwrap().pages.get(id).cloned())
    }

    async fn find_latest_available(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<Option<StatusListPage>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .page_order
            .iter()
            .rev()
            .filter_map(|id| tables.pages.get(id))
            .find(|page| {
                page.status_purpose == purpose
                    && page.credential_type == credential_type
                    && page.state == PageState::Available
            })
            .cloned())
    }

    async fn transition(
        &self,
        id: &str,
        from: PageState,
        to: PageState,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        match tables.pages.get_mut(id) {
            Some(page) if page.state == from => {
                page.state = to;
                page.updated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_document(
        &self,
        id: &str,
        expected_version: i64,
        document: String,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        let page = tables.pages.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if page.version != expected_version {
            return Ok(false);
        }
        page.vc_document = document;
        page.version += 1;
        page.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn page_ids(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.tables.read().unwrap().page_order.clone())
    }
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn first_free(&self, page_id: &str) -> Result<Option<i64>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables.slots.get(page_id).and_then(|slots| {
            slots
                .iter()
                .find(|(_, assigned)| !**assigned)
                .map(|(index, _)| *index)
        }))
    }

    async fn assign(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        match tables.slots.get_mut(page_id).and_then(|s| s.get_mut(&index)) {
            Some(assigned) if !*assigned => {
                *assigned = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn assign_many(&self, page_id: &str, indices: &[i64]) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        let Some(slots) = tables.slots.get_mut(page_id) else {
            return Ok(0);
        };
        let mut taken = 0;
        for index in indices {
            if let Some(assigned) = slots.get_mut(index) {
                if !*assigned {
                    *assigned = true;
                    taken += 1;
                }
            }
        }
        Ok(taken)
    }

    async fn release(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        match tables.slots.get_mut(page_id).and_then(|s| s.get_mut(&index)) {
            Some(assigned) if *assigned => {
                *assigned = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self, page_id: &str) -> Result<SlotStats, RepositoryError> {
        let tables = self.tables.read().unwrap();
        let Some(slots) = tables.slots.get(page_id) else {
            return Ok(SlotStats::default());
        };
        let total_count = slots.len() as u64;
        let assigned_count = slots.values().filter(|assigned| **assigned).count() as u64;
        Ok(SlotStats {
            assigned_count,
            available_count: total_count - assigned_count,
            total_count,
        })
    }

    async fn assigned_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .slots
            .get(page_id)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|(_, assigned)| **assigned)
                    .map(|(index, _)| *index)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatusRepository for MemoryStore {
    async fn insert(&self, record: NewStatusRecord) -> Result<StatusRecord, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        let key = (record.credential_id.clone(), record.binding.purpose);
        if tables.statuses.contains_key(&key) {
            return Err(RepositoryError::Duplicate);
        }
        let status = StatusRecord {
            credential_id: record.credential_id,
            status_purpose: record.binding.purpose,
            page_id: record.binding.page_id,
            slot_index: record.binding.index,
            status_value: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.statuses.insert(key, status.clone());
        Ok(status)
    }

    async fn delete(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        Ok(tables
            .statuses
            .remove(&(credential_id.to_string(), purpose))
            .is_some())
    }

    async fn find(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<Option<StatusRecord>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .statuses
            .get(&(credential_id.to_string(), purpose))
            .cloned())
    }

    async fn compare_and_set(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
        value: bool,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        let Some(record) = tables.statuses.get_mut(&(credential_id.to_string(), purpose)) else {
            return Ok(StatusChange::NotFound);
        };
        if record.status_value == value {
            return Ok(StatusChange::Unchanged(record.clone()));
        }

        let now = Utc::now();
        record.status_value = value;
        record.updated_at = Some(now);
        let (page_id, slot_index) = (record.page_id.clone(), record.slot_index);

        let entry = TransactionEntry {
            id: tables.transactions.len() as i64 + 1,
            credential_id: credential_id.to_string(),
            status_purpose: purpose,
            status_value: value,
            page_id,
            slot_index,
            created_at: now,
        };
        tables.transactions.push(entry.clone());
        Ok(StatusChange::Changed(entry))
    }

    async fn flagged_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .statuses
            .values()
            .filter(|record| record.page_id == page_id && record.status_value)
            .map(|record| record.slot_index)
            .collect())
    }

    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
        after_id: Option<i64>,
        limit: u64,
    ) -> Result<Vec<TransactionEntry>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        let mut entries: Vec<_> = tables
            .transactions
            .iter()
            .filter(|entry| {
                entry.created_at > since
                    || after_id.is_some_and(|id| entry.created_at == since && entry.id > id)
            })
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.created_at, entry.id));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn insert(&self, entry: LedgerEntry) -> Result<LedgerEntry, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        if tables
            .ledger
            .iter()
            .any(|e| e.credential_id == entry.credential_id)
        {
            return Err(RepositoryError::Duplicate);
        }
        tables.ledger.push(entry.clone());
        Ok(entry)
    }

    async fn find(&self, credential_id: &str) -> Result<Option<LedgerEntry>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .ledger
            .iter()
            .find(|e| e.credential_id == credential_id)
            .cloned())
    }

    async fn append_binding(
        &self,
        credential_id: &str,
        binding: StatusBinding,
    ) -> Result<LedgerEntry, RepositoryError> {
        let mut tables = self.tables.write().unwrap();
        let entry = tables
            .ledger
            .iter_mut()
            .find(|e| e.credential_id == credential_id)
            .ok_or(RepositoryError::NotFound)?;
        if entry.status_bindings.for_purpose(binding.purpose).is_some() {
            return Err(RepositoryError::Duplicate);
        }
        entry.status_bindings.0.push(binding);
        Ok(entry.clone())
    }

    async fn search(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    async fn find_by_binding(
        &self,
        page_id: &str,
        index: i64,
    ) -> Result<Option<LedgerEntry>, RepositoryError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .ledger
            .iter()
            .find(|e| e.status_bindings.contains(page_id, index))
            .cloned())
    }
}

pub fn page_model(capacity: i64) -> StatusListPage {
    StatusListPage {
        id: uuid::Uuid::new_v4().to_string(),
        vc_document: String::new(),
        credential_type: "VerifiableCredential".to_string(),
        status_purpose: StatusPurpose::Revocation,
        capacity,
        state: PageState::Available,
        version: 0,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn page_settings(capacity: u64) -> PageSettings {
    PageSettings {
        capacity,
        usable_capacity_percentage: 100,
        allocation_retries: 10,
        issuer_id: "did:web:example.com".to_string(),
        domain: "example.com".to_string(),
    }
}

pub fn page_manager(store: Arc<MemoryStore>, capacity: u64) -> PageManager {
    PageManager::new(
        store.clone(),
        SlotTable::new(store.clone()),
        store,
        Arc::new(UnsignedDocuments),
        Cache::new(300, 100),
        page_settings(capacity),
    )
    .unwrap()
}

pub fn test_app_state(store: Arc<MemoryStore>) -> AppState {
    AppState::from_store(
        store,
        page_settings(16),
        Cache::new(300, 100),
        1000,
        vec![StatusPurpose::Revocation],
    )
    .unwrap()
}
