use std::sync::Arc;

use crate::{database::repository::SlotRepository, models::SlotStats};

use super::error::StatusError;

/// Allocation primitives over a page's slot rows.
#[derive(Clone)]
pub struct SlotTable {
    repo: Arc<dyn SlotRepository>,
}

impl SlotTable {
    pub fn new(repo: Arc<dyn SlotRepository>) -> Self {
        Self { repo }
    }

    /// Lowest unassigned index of the page.
    pub async fn find_suitable(&self, page_id: &str) -> Result<Option<i64>, StatusError> {
        Ok(self.repo.first_free(page_id).await?)
    }

    /// Compare-and-swap; `false` means another caller holds the index.
    pub async fn assign(&self, page_id: &str, index: i64) -> Result<bool, StatusError> {
        let assigned = self.repo.assign(page_id, index).await?;
        if !assigned {
            tracing::debug!("Lost assignment race for index {index} of page {page_id}");
        }
        Ok(assigned)
    }

    pub async fn assign_batch(&self, page_id: &str, indices: &[i64]) -> Result<u64, StatusError> {
        Ok(self.repo.assign_many(page_id, indices).await?)
    }

    pub async fn release(&self, page_id: &str, index: i64) -> Result<bool, StatusError> {
        let released = self.repo.release(page_id, index).await?;
        if released {
            tracing::info!("Released index {index} of page {page_id}");
        } else {
            tracing::warn!("Index {index} of page {page_id} was not assigned");
        }
        Ok(released)
    }

    pub async fn stats(&self, page_id: &str) -> Result<SlotStats, StatusError> {
        Ok(self.repo.stats(page_id).await?)
    }

    pub async fn assigned_indices(&self, page_id: &str) -> Result<Vec<i64>, StatusError> {
        Ok(self.repo.assigned_indices(page_id).await?)
    }
}
