use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use secrecy::ExposeSecret;

use crate::{
    config::Config,
    database::{
        queries::SeaOrmStore,
        repository::{LedgerRepository, PageRepository, SlotRepository, StatusRepository},
    },
    models::StatusPurpose,
    services::{
        error::StatusError,
        issuance::IssuanceService,
        ledger::IssuanceLedger,
        pages::{PageManager, PageSettings},
        slots::SlotTable,
        status::StatusService,
    },
};

use super::{cache::Cache, document::UnsignedDocuments};

#[derive(Clone)]
pub struct AppState {
    pub pages: Arc<PageManager>,
    pub statuses: Arc<StatusService>,
    pub ledger: Arc<IssuanceLedger>,
    pub issuance: Arc<IssuanceService>,
}

impl AppState {
    /// Wires every service onto one store.
    pub fn from_store<S>(
        store: Arc<S>,
        settings: PageSettings,
        cache: Cache,
        feed_page_size: u64,
        default_purposes: Vec<StatusPurpose>,
    ) -> Result<Self, StatusError>
    where
        S: PageRepository + SlotRepository + StatusRepository + LedgerRepository + 'static,
    {
        let pages = Arc::new(PageManager::new(
            store.clone(),
            SlotTable::new(store.clone()),
            store.clone(),
            Arc::new(UnsignedDocuments),
            cache,
            settings,
        )?);
        let ledger = Arc::new(IssuanceLedger::new(store.clone()));
        let statuses = Arc::new(StatusService::new(
            store.clone(),
            pages.clone(),
            feed_page_size,
        ));
        let issuance = Arc::new(IssuanceService::new(
            pages.clone(),
            store,
            ledger.clone(),
            default_purposes,
        ));

        Ok(Self {
            pages,
            statuses,
            ledger,
            issuance,
        })
    }
}

pub async fn setup(config: &Config) -> Result<AppState> {
    let db = Database::connect(config.database.url.expose_secret())
        .await
        .wrap_err("Failed to connect to database")?;

    crate::database::Migrator::up(&db, None)
        .await
        .wrap_err("Failed to apply migrations")?;

    let settings = PageSettings {
        capacity: config.status_list.effective_capacity(),
        usable_capacity_percentage: config.status_list.usable_capacity_percentage,
        allocation_retries: config.status_list.allocation_retries,
        issuer_id: config.status_list.issuer_id.clone(),
        domain: config.server.domain.clone(),
    };
    let cache = Cache::new(config.cache.ttl, config.cache.max_capacity);
    let store = Arc::new(SeaOrmStore::new(Arc::new(db)));

    let state = AppState::from_store(
        store,
        settings,
        cache,
        config.status_list.feed_page_size,
        config.status_list.purposes.clone(),
    )?;
    tracing::info!(
        "Status lists hold {} bits per page; default purposes {:?}",
        state.pages.settings().capacity,
        state.issuance.default_purposes()
    );
    Ok(state)
}
