use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use serde::Serialize;

use crate::{
    database::repository::{PageRepository, StatusRepository},
    models::{PageState, SlotStats, StatusBinding, StatusListPage, StatusPurpose},
    utils::{
        cache::Cache,
        codec,
        document::{self, DocumentSigner},
        errors::CodecError,
    },
};

use super::{error::StatusError, slots::SlotTable};

/// How many pages a single acquisition may move through before giving up.
const MAX_PAGE_ATTEMPTS: usize = 5;
const MAX_REFRESH_ATTEMPTS: usize = 5;

#[derive(Clone, Debug)]
pub struct PageSettings {
    /// Bits per new page.
    pub capacity: u64,
    pub usable_capacity_percentage: u8,
    pub allocation_retries: u32,
    pub issuer_id: String,
    pub domain: String,
}

impl PageSettings {
    /// Assigned count at which a page of `capacity` bits becomes FULL.
    pub fn usable_threshold(&self, capacity: u64) -> u64 {
        let percentage = u64::from(self.usable_capacity_percentage.clamp(1, 100));
        (capacity * percentage / 100).max(1)
    }
}

enum Allocation {
    Assigned(i64),
    Exhausted,
    Contended,
}

#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: Vec<String>,
}

/// Owns page lifecycle and the published documents.
pub struct PageManager {
    pages: Arc<dyn PageRepository>,
    slots: SlotTable,
    statuses: Arc<dyn StatusRepository>,
    signer: Arc<dyn DocumentSigner>,
    cache: Cache,
    settings: PageSettings,
}

impl PageManager {
    pub fn new(
        pages: Arc<dyn PageRepository>,
        slots: SlotTable,
        statuses: Arc<dyn StatusRepository>,
        signer: Arc<dyn DocumentSigner>,
        cache: Cache,
        settings: PageSettings,
    ) -> Result<Self, StatusError> {
        codec::validate_capacity(settings.capacity as usize)
            .map_err(|_| StatusError::InvalidCapacity(settings.capacity))?;
        Ok(Self {
            pages,
            slots,
            statuses,
            signer,
            cache,
            settings,
        })
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn page_url(&self, page_id: &str) -> String {
        document::page_url(&self.settings.domain, page_id)
    }

    /// Allocates one bit for a credential of the given lane.
    pub async fn acquire_slot(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<StatusBinding, StatusError> {
        let mut page = match self
            .pages
            .find_latest_available(purpose, credential_type)
            .await?
        {
            Some(page) => page,
            None => self.create_lane_page(purpose, credential_type).await?,
        };

        for _ in 0..MAX_PAGE_ATTEMPTS {
            match self.allocate_from(&page.id).await? {
                Allocation::Assigned(index) => {
                    self.on_slot_assigned(&page.id).await?;
                    return Ok(StatusBinding {
                        page_id: page.id,
                        index,
                        purpose,
                    });
                }
                Allocation::Exhausted => {
                    self.mark_full(&page.id).await?;
                    page = match self
                        .pages
                        .find_latest_available(purpose, credential_type)
                        .await?
                    {
                        Some(next) if next.id != page.id => next,
                        _ => self.create_lane_page(purpose, credential_type).await?,
                    };
                }
                Allocation::Contended => {
                    tracing::warn!(
                        "Allocation retries exhausted on page {}; opening a new page",
                        page.id
                    );
                    page = self.create_lane_page(purpose, credential_type).await?;
                }
            }
        }

        Err(StatusError::AllocationExhausted {
            purpose,
            credential_type: credential_type.to_owned(),
        })
    }

    async fn allocate_from(&self, page_id: &str) -> Result<Allocation, StatusError> {
        for _ in 0..=self.settings.allocation_retries {
            let Some(index) = self.slots.find_suitable(page_id).await? else {
                return Ok(Allocation::Exhausted);
            };
            if self.slots.assign(page_id, index).await? {
                return Ok(Allocation::Assigned(index));
            }
        }
        Ok(Allocation::Contended)
    }

    /// Moves the page to FULL once its usable capacity is taken.
    pub async fn on_slot_assigned(&self, page_id: &str) -> Result<(), StatusError> {
        let stats = self.slots.stats(page_id).await?;
        if stats.assigned_count >= self.settings.usable_threshold(stats.total_count) {
            self.mark_full(page_id).await?;
        }
        Ok(())
    }

    async fn mark_full(&self, page_id: &str) -> Result<(), StatusError> {
        if self
            .pages
            .transition(page_id, PageState::Available, PageState::Full)
            .await?
        {
            tracing::info!("Status list page {page_id} is now FULL");
        } else {
            tracing::debug!("Status list page {page_id} was already FULL");
        }
        Ok(())
    }

    async fn create_lane_page(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<StatusListPage, StatusError> {
        self.create_page(purpose, credential_type)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create a {purpose} status list page: {e}");
                StatusError::AllocationExhausted {
                    purpose,
                    credential_type: credential_type.to_owned(),
                }
            })
    }

    /// Creates an AVAILABLE page with an all-false document and a full slot table.
    pub async fn create_page(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<StatusListPage, StatusError> {
        let mut page = StatusListPage {
            id: uuid::Uuid::new_v4().to_string(),
            vc_document: String::new(),
            credential_type: credential_type.to_owned(),
            status_purpose: purpose,
            capacity: self.settings.capacity as i64,
            state: PageState::Available,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        };
        let encoded = codec::encode_empty(self.settings.capacity as usize)
            .map_err(|e| StatusError::codec(&page.id, e))?;
        page.vc_document = self.signed_document(&page, &encoded).await?;

        let page = self.pages.create_page(page).await?;
        tracing::info!(
            "Created {purpose} status list page {} with {} slots",
            page.id,
            page.capacity
        );
        Ok(page)
    }

    async fn signed_document(
        &self,
        page: &StatusListPage,
        encoded_list: &str,
    ) -> Result<String, StatusError> {
        let unsigned = document::build_document(
            page,
            encoded_list,
            &self.settings.issuer_id,
            &self.page_url(&page.id),
        );
        let signed = self
            .signer
            .sign(unsigned)
            .await
            .map_err(StatusError::Signing)?;
        Ok(signed.to_string())
    }

    /// Recomputes and stores the page document from slot and status state.
    ///
    /// The page version is read before the state it is computed from. A write
    /// that lost against a concurrent refresh is recomputed from fresh state, so
    /// the last stored document never reflects older status values.
    pub async fn refresh_document(&self, page_id: &str) -> Result<(), StatusError> {
        for attempt in 1..=MAX_REFRESH_ATTEMPTS {
            let page = self.find_page(page_id).await?;
            let encoded = self.encode_current(&page).await?;
            let document = self.signed_document(&page, &encoded).await?;

            if self
                .pages
                .update_document(page_id, page.version, document)
                .await?
            {
                self.cache.page_document_cache.invalidate(page_id).await;
                tracing::debug!("Refreshed document of status list page {page_id}");
                return Ok(());
            }
            tracing::debug!(
                "Document of status list page {page_id} changed concurrently (attempt {attempt})"
            );
        }

        Err(StatusError::RefreshConflict(page_id.to_owned()))
    }

    async fn encode_current(&self, page: &StatusListPage) -> Result<String, StatusError> {
        let capacity = page.capacity as usize;
        let assigned: HashSet<i64> = self
            .slots
            .assigned_indices(&page.id)
            .await?
            .into_iter()
            .collect();
        let mut bits = vec![false; capacity];
        for index in self.statuses.flagged_indices(&page.id).await? {
            if assigned.contains(&index) && (index as usize) < capacity {
                bits[index as usize] = true;
            }
        }
        codec::encode(&bits).map_err(|e| StatusError::codec(&page.id, e))
    }

    /// Recomputes every page; failures are reported per page.
    pub async fn refresh_all(&self) -> Result<RefreshReport, StatusError> {
        let mut report = RefreshReport::default();
        for page_id in self.pages.page_ids().await? {
            match self.refresh_document(&page_id).await {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    tracing::error!("Failed to refresh status list page {page_id}: {e}");
                    report.failed.push(page_id);
                }
            }
        }
        Ok(report)
    }

    pub async fn find_page(&self, page_id: &str) -> Result<StatusListPage, StatusError> {
        self.pages
            .find_page(page_id)
            .await?
            .ok_or_else(|| StatusError::PageNotFound(page_id.to_owned()))
    }

    /// The published document of a page.
    pub async fn document(&self, page_id: &str) -> Result<String, StatusError> {
        if let Some(document) = self.cache.page_document_cache.get(page_id).await {
            tracing::debug!("Cache hit for status list page {page_id}");
            return Ok(document);
        }

        let page = self.find_page(page_id).await?;
        self.cache
            .page_document_cache
            .insert(page_id.to_owned(), page.vc_document.clone())
            .await;
        Ok(page.vc_document)
    }

    /// Decodes the bitstring currently published for a page.
    pub async fn decode(&self, page_id: &str) -> Result<Vec<bool>, StatusError> {
        let page = self.find_page(page_id).await?;
        let encoded = document::encoded_list(&page.vc_document)
            .ok_or_else(|| StatusError::codec(page_id, CodecError::Empty))?;
        codec::decode(&encoded, page.capacity as usize).map_err(|e| StatusError::codec(page_id, e))
    }

    pub async fn stats(&self, page_id: &str) -> Result<SlotStats, StatusError> {
        self.find_page(page_id).await?;
        self.slots.stats(page_id).await
    }

    /// Rolls back an allocation that never reached the ledger.
    pub async fn release(&self, page_id: &str, index: i64) -> Result<bool, StatusError> {
        self.slots.release(page_id, index).await
    }
}
