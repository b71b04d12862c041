use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    database::repository::StatusRepository,
    models::{StatusChange, StatusPurpose, StatusRecord, TransactionEntry},
};

use super::{error::StatusError, pages::PageManager};

/// Status flips and the replication feed.
pub struct StatusService {
    repo: Arc<dyn StatusRepository>,
    pages: Arc<PageManager>,
    feed_page_size: u64,
}

impl StatusService {
    pub fn new(
        repo: Arc<dyn StatusRepository>,
        pages: Arc<PageManager>,
        feed_page_size: u64,
    ) -> Self {
        Self {
            repo,
            pages,
            feed_page_size: feed_page_size.max(1),
        }
    }

    /// Sets the status of a credential for a purpose.
    ///
    /// Returns the appended log entry, or `None` when the value was already set.
    /// A committed change is followed by a regeneration of the owning page.
    pub async fn set_status(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
        value: bool,
    ) -> Result<Option<TransactionEntry>, StatusError> {
        match self.repo.compare_and_set(credential_id, purpose, value).await? {
            StatusChange::NotFound => Err(StatusError::CredentialNotFound {
                credential_id: credential_id.to_owned(),
                purpose,
            }),
            StatusChange::Unchanged(_) => {
                tracing::debug!("{purpose} status of {credential_id} already {value}");
                Ok(None)
            }
            StatusChange::Changed(entry) => {
                tracing::info!(
                    "Set {purpose} status of {credential_id} to {value} (page {}, index {})",
                    entry.page_id,
                    entry.slot_index
                );
                self.pages.refresh_document(&entry.page_id).await?;
                Ok(Some(entry))
            }
        }
    }

    pub async fn get_status(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<bool, StatusError> {
        Ok(self.record(credential_id, purpose).await?.status_value)
    }

    pub async fn record(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<StatusRecord, StatusError> {
        self.repo
            .find(credential_id, purpose)
            .await?
            .ok_or_else(|| StatusError::CredentialNotFound {
                credential_id: credential_id.to_owned(),
                purpose,
            })
    }

    /// Log entries after a cursor, oldest first.
    ///
    /// At most `feed_page_size` entries are returned. The last entry's
    /// `created_at` and `id` form the cursor for the next call.
    pub async fn transactions_since(
        &self,
        since: DateTime<Utc>,
        after_id: Option<i64>,
    ) -> Result<Vec<TransactionEntry>, StatusError> {
        Ok(self
            .repo
            .transactions_since(since, after_id, self.feed_page_size)
            .await?)
    }
}
