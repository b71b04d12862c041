use std::{collections::BTreeMap, fmt, str::FromStr};

use sea_orm::{entity::prelude::*, sea_query::StringLen, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Semantic meaning of a status bit.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum,
    Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum StatusPurpose {
    #[sea_orm(string_value = "revocation")]
    Revocation,
    #[sea_orm(string_value = "suspension")]
    Suspension,
}

impl StatusPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusPurpose::Revocation => "revocation",
            StatusPurpose::Suspension => "suspension",
        }
    }
}

impl fmt::Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revocation" => Ok(StatusPurpose::Revocation),
            "suspension" => Ok(StatusPurpose::Suspension),
            other => Err(format!("unknown status purpose: {other}")),
        }
    }
}

/// Lifecycle state of a status list page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "UPPERCASE")]
pub enum PageState {
    #[sea_orm(string_value = "AVAILABLE")]
    Available,
    #[sea_orm(string_value = "FULL")]
    Full,
}

/// Links a credential to one bit of a page for one purpose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBinding {
    pub page_id: String,
    pub index: i64,
    pub purpose: StatusPurpose,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StatusBindings(pub Vec<StatusBinding>);

impl StatusBindings {
    pub fn for_purpose(&self, purpose: StatusPurpose) -> Option<&StatusBinding> {
        self.0.iter().find(|binding| binding.purpose == purpose)
    }

    pub fn contains(&self, page_id: &str, index: i64) -> bool {
        self.0
            .iter()
            .any(|binding| binding.page_id == page_id && binding.index == index)
    }
}

/// Searchable attributes captured at issuance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct IndexedAttributes(pub BTreeMap<String, JsonValue>);

impl IndexedAttributes {
    pub fn contains(&self, key: &str, value: &str) -> bool {
        matches!(self.0.get(key), Some(JsonValue::String(v)) if v == value)
    }
}

// Status list pages
pub mod status_list_pages {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "status_list_pages")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        #[sea_orm(column_type = "Text")]
        pub vc_document: String,
        pub credential_type: String,
        pub status_purpose: StatusPurpose,
        /// Number of bits in the page, fixed at creation.
        pub capacity: i64,
        pub state: PageState,
        /// Bumped on every document write.
        pub version: i64,
        pub created_at: DateTimeUtc,
        pub updated_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// One row per bit position of a page
pub mod status_list_slots {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "status_list_slots")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub page_id: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub slot_index: i64,
        pub assigned: bool,
        pub created_at: DateTimeUtc,
        pub updated_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Current status of a credential for a purpose
pub mod credential_statuses {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "credential_statuses")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub credential_id: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub status_purpose: StatusPurpose,
        pub page_id: String,
        pub slot_index: i64,
        pub status_value: bool,
        pub created_at: DateTimeUtc,
        pub updated_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Append-only status change log
pub mod status_transactions {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "status_transactions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub credential_id: String,
        pub status_purpose: StatusPurpose,
        pub status_value: bool,
        pub page_id: String,
        pub slot_index: i64,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Issuance ledger
pub mod ledger {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "ledger")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub credential_id: String,
        pub issuer_id: String,
        pub credential_type: String,
        pub issue_date: DateTimeUtc,
        pub expiration_date: Option<DateTimeUtc>,
        #[sea_orm(column_type = "JsonBinary")]
        pub indexed_attributes: IndexedAttributes,
        #[sea_orm(column_type = "JsonBinary")]
        pub status_bindings: StatusBindings,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub type StatusListPage = status_list_pages::Model;
pub type StatusRecord = credential_statuses::Model;
pub type TransactionEntry = status_transactions::Model;
pub type LedgerEntry = ledger::Model;

/// Slot usage of a single page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStats {
    pub assigned_count: u64,
    pub available_count: u64,
    pub total_count: u64,
}

/// Fields of a new status record; the value starts as `false`.
#[derive(Clone, Debug)]
pub struct NewStatusRecord {
    pub credential_id: String,
    pub binding: StatusBinding,
}

/// Result of an atomic compare-and-set on a status record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusChange {
    NotFound,
    Unchanged(StatusRecord),
    Changed(TransactionEntry),
}
