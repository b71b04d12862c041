use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr,
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    TransactionTrait,
};
use serde_json::json;

use crate::{
    database::{
        error::RepositoryError,
        repository::{LedgerRepository, PageRepository, SlotRepository, StatusRepository},
    },
    models::{
        credential_statuses, ledger, status_list_pages, status_list_slots, status_transactions,
        LedgerEntry, NewStatusRecord, PageState, SlotStats, StatusBinding, StatusChange,
        StatusListPage, StatusPurpose, StatusRecord, TransactionEntry,
    },
    services::ledger::LedgerQuery,
};

/// Sea-orm backed implementation of every repository trait.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PageRepository for SeaOrmStore {
    async fn create_page(&self, page: StatusListPage) -> Result<StatusListPage, RepositoryError> {
        let txn = self.db.begin().await?;

        let active: status_list_pages::ActiveModel = page.clone().into();
        status_list_pages::Entity::insert(active)
            .exec_without_returning(&txn)
            .await
            .map_err(RepositoryError::from_insert)?;

        // Eagerly create one unassigned slot per bit
        let populate = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"INSERT INTO status_list_slots (page_id, slot_index, assigned, created_at)
               SELECT $1, generate_series(0, $2 - 1), false, $3"#,
            [
                page.id.clone().into(),
                page.capacity.into(),
                page.created_at.into(),
            ],
        );
        let inserted = txn.execute(populate).await?.rows_affected();
        tracing::debug!("Initialized {inserted} slots for page {}", page.id);

        txn.commit().await?;
        Ok(page)
    }

    async fn find_page(&self, id: &str) -> Result<Option<StatusListPage>, RepositoryError> {
        Ok(status_list_pages::Entity::find_by_id(id.to_owned())
            .one(self.db.as_ref())
            .await?)
    }

    async fn find_latest_available(
        &self,
        purpose: StatusPurpose,
        credential_type: &str,
    ) -> Result<Option<StatusListPage>, RepositoryError> {
        Ok(status_list_pages::Entity::find()
            .filter(status_list_pages::Column::StatusPurpose.eq(purpose))
            .filter(status_list_pages::Column::CredentialType.eq(credential_type))
            .filter(status_list_pages::Column::State.eq(PageState::Available))
            .order_by_desc(status_list_pages::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?)
    }

    async fn transition(
        &self,
        id: &str,
        from: PageState,
        to: PageState,
    ) -> Result<bool, RepositoryError> {
        let result = status_list_pages::Entity::update_many()
            .col_expr(status_list_pages::Column::State, Expr::value(to))
            .col_expr(status_list_pages::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(status_list_pages::Column::Id.eq(id))
            .filter(status_list_pages::Column::State.eq(from))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn update_document(
        &self,
        id: &str,
        expected_version: i64,
        document: String,
    ) -> Result<bool, RepositoryError> {
        let result = status_list_pages::Entity::update_many()
            .col_expr(status_list_pages::Column::VcDocument, Expr::value(document))
            .col_expr(
                status_list_pages::Column::Version,
                Expr::col(status_list_pages::Column::Version).add(1),
            )
            .col_expr(status_list_pages::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(status_list_pages::Column::Id.eq(id))
            .filter(status_list_pages::Column::Version.eq(expected_version))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn page_ids(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(status_list_pages::Entity::find()
            .select_only()
            .column(status_list_pages::Column::Id)
            .order_by_asc(status_list_pages::Column::CreatedAt)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl SlotRepository for SeaOrmStore {
    async fn first_free(&self, page_id: &str) -> Result<Option<i64>, RepositoryError> {
        Ok(status_list_slots::Entity::find()
            .select_only()
            .column(status_list_slots::Column::SlotIndex)
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::Assigned.eq(false))
            .order_by_asc(status_list_slots::Column::SlotIndex)
            .into_tuple::<i64>()
            .one(self.db.as_ref())
            .await?)
    }

    async fn assign(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError> {
        // Single conditional update: concurrent callers can never both win
        let result = status_list_slots::Entity::update_many()
            .col_expr(status_list_slots::Column::Assigned, Expr::value(true))
            .col_expr(status_list_slots::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::SlotIndex.eq(index))
            .filter(status_list_slots::Column::Assigned.eq(false))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn assign_many(&self, page_id: &str, indices: &[i64]) -> Result<u64, RepositoryError> {
        if indices.is_empty() {
            return Ok(0);
        }
        let result = status_list_slots::Entity::update_many()
            .col_expr(status_list_slots::Column::Assigned, Expr::value(true))
            .col_expr(status_list_slots::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::SlotIndex.is_in(indices.iter().copied()))
            .filter(status_list_slots::Column::Assigned.eq(false))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn release(&self, page_id: &str, index: i64) -> Result<bool, RepositoryError> {
        let result = status_list_slots::Entity::update_many()
            .col_expr(status_list_slots::Column::Assigned, Expr::value(false))
            .col_expr(status_list_slots::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::SlotIndex.eq(index))
            .filter(status_list_slots::Column::Assigned.eq(true))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn stats(&self, page_id: &str) -> Result<SlotStats, RepositoryError> {
        let total_count = status_list_slots::Entity::find()
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .count(self.db.as_ref())
            .await?;
        let assigned_count = status_list_slots::Entity::find()
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::Assigned.eq(true))
            .count(self.db.as_ref())
            .await?;
        Ok(SlotStats {
            assigned_count,
            available_count: total_count.saturating_sub(assigned_count),
            total_count,
        })
    }

    async fn assigned_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError> {
        Ok(status_list_slots::Entity::find()
            .select_only()
            .column(status_list_slots::Column::SlotIndex)
            .filter(status_list_slots::Column::PageId.eq(page_id))
            .filter(status_list_slots::Column::Assigned.eq(true))
            .order_by_asc(status_list_slots::Column::SlotIndex)
            .into_tuple::<i64>()
            .all(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl StatusRepository for SeaOrmStore {
    async fn insert(&self, record: NewStatusRecord) -> Result<StatusRecord, RepositoryError> {
        let model = StatusRecord {
            credential_id: record.credential_id,
            status_purpose: record.binding.purpose,
            page_id: record.binding.page_id,
            slot_index: record.binding.index,
            status_value: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        let active: credential_statuses::ActiveModel = model.clone().into();
        credential_statuses::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(RepositoryError::from_insert)?;
        Ok(model)
    }

    async fn delete(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<bool, RepositoryError> {
        let result =
            credential_statuses::Entity::delete_by_id((credential_id.to_owned(), purpose))
                .exec(self.db.as_ref())
                .await?;
        Ok(result.rows_affected == 1)
    }

    async fn find(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
    ) -> Result<Option<StatusRecord>, RepositoryError> {
        Ok(
            credential_statuses::Entity::find_by_id((credential_id.to_owned(), purpose))
                .one(self.db.as_ref())
                .await?,
        )
    }

    async fn compare_and_set(
        &self,
        credential_id: &str,
        purpose: StatusPurpose,
        value: bool,
    ) -> Result<StatusChange, RepositoryError> {
        let txn = self.db.begin().await?;

        let Some(record) =
            credential_statuses::Entity::find_by_id((credential_id.to_owned(), purpose))
                .lock_exclusive()
                .one(&txn)
                .await?
        else {
            txn.rollback().await?;
            return Ok(StatusChange::NotFound);
        };

        if record.status_value == value {
            txn.commit().await?;
            return Ok(StatusChange::Unchanged(record));
        }

        let now = Utc::now();
        let mut active: credential_statuses::ActiveModel = record.clone().into();
        active.status_value = Set(value);
        active.updated_at = Set(Some(now));
        active.update(&txn).await?;

        let entry = status_transactions::ActiveModel {
            credential_id: Set(record.credential_id),
            status_purpose: Set(purpose),
            status_value: Set(value),
            page_id: Set(record.page_id),
            slot_index: Set(record.slot_index),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(StatusChange::Changed(entry))
    }

    async fn flagged_indices(&self, page_id: &str) -> Result<Vec<i64>, RepositoryError> {
        Ok(credential_statuses::Entity::find()
            .select_only()
            .column(credential_statuses::Column::SlotIndex)
            .filter(credential_statuses::Column::PageId.eq(page_id))
            .filter(credential_statuses::Column::StatusValue.eq(true))
            .into_tuple::<i64>()
            .all(self.db.as_ref())
            .await?)
    }

    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
        after_id: Option<i64>,
        limit: u64,
    ) -> Result<Vec<TransactionEntry>, RepositoryError> {
        let mut cursor = Condition::any().add(status_transactions::Column::CreatedAt.gt(since));
        if let Some(id) = after_id {
            cursor = cursor.add(
                Condition::all()
                    .add(status_transactions::Column::CreatedAt.eq(since))
                    .add(status_transactions::Column::Id.gt(id)),
            );
        }

        Ok(status_transactions::Entity::find()
            .filter(cursor)
            .order_by_asc(status_transactions::Column::CreatedAt)
            .order_by_asc(status_transactions::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl LedgerRepository for SeaOrmStore {
    async fn insert(&self, entry: LedgerEntry) -> Result<LedgerEntry, RepositoryError> {
        let active: ledger::ActiveModel = entry.clone().into();
        ledger::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(RepositoryError::from_insert)?;
        Ok(entry)
    }

    async fn find(&self, credential_id: &str) -> Result<Option<LedgerEntry>, RepositoryError> {
        Ok(ledger::Entity::find_by_id(credential_id.to_owned())
            .one(self.db.as_ref())
            .await?)
    }

    async fn append_binding(
        &self,
        credential_id: &str,
        binding: StatusBinding,
    ) -> Result<LedgerEntry, RepositoryError> {
        let txn = self.db.begin().await?;

        let Some(entry) = ledger::Entity::find_by_id(credential_id.to_owned())
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Err(RepositoryError::NotFound);
        };

        if entry.status_bindings.for_purpose(binding.purpose).is_some() {
            txn.rollback().await?;
            return Err(RepositoryError::Duplicate);
        }

        let mut bindings = entry.status_bindings.clone();
        bindings.0.push(binding);
        let mut active: ledger::ActiveModel = entry.into();
        active.status_bindings = Set(bindings);
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    async fn search(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let mut select = ledger::Entity::find();
        if let Some(issuer_id) = &query.issuer_id {
            select = select.filter(ledger::Column::IssuerId.eq(issuer_id.as_str()));
        }
        if let Some(credential_type) = &query.credential_type {
            select = select.filter(ledger::Column::CredentialType.eq(credential_type.as_str()));
        }
        if let Some(credential_id) = &query.credential_id {
            select = select.filter(ledger::Column::CredentialId.eq(credential_id.as_str()));
        }
        // Each predicate narrows the result through jsonb containment
        for predicate in &query.attributes {
            let mut pair = serde_json::Map::new();
            pair.insert(predicate.key.clone(), json!(predicate.value));
            select = select.filter(Expr::cust_with_values(
                "indexed_attributes @> $1",
                [serde_json::Value::Object(pair)],
            ));
        }

        Ok(select
            .order_by_asc(ledger::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    async fn find_by_binding(
        &self,
        page_id: &str,
        index: i64,
    ) -> Result<Option<LedgerEntry>, RepositoryError> {
        Ok(ledger::Entity::find()
            .filter(Expr::cust_with_values(
                "status_bindings @> $1",
                [json!([{ "page_id": page_id, "index": index }])],
            ))
            .one(self.db.as_ref())
            .await?)
    }
}
