use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;

use crate::{
    database::{error::RepositoryError, repository::LedgerRepository},
    models::{IndexedAttributes, LedgerEntry, StatusBinding, StatusBindings},
};

use super::error::StatusError;

pub const DEFAULT_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// Equality predicate on one indexed attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributePredicate {
    pub key: String,
    pub value: String,
}

/// Structured ledger search.
///
/// All predicates are ANDed. Blank keys or values are dropped when the
/// query is built, so they never widen or narrow the result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerQuery {
    pub issuer_id: Option<String>,
    pub credential_type: Option<String>,
    pub credential_id: Option<String>,
    pub attributes: Vec<AttributePredicate>,
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

impl LedgerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issuer(mut self, issuer_id: &str) -> Self {
        self.issuer_id = non_blank(issuer_id);
        self
    }

    pub fn credential_type(mut self, credential_type: &str) -> Self {
        self.credential_type = non_blank(credential_type);
        self
    }

    pub fn credential_id(mut self, credential_id: &str) -> Self {
        self.credential_id = non_blank(credential_id);
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        if let (Some(key), Some(value)) = (non_blank(key), non_blank(value)) {
            self.attributes.push(AttributePredicate { key, value });
        }
        self
    }

    pub fn attributes<'a>(self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        pairs
            .into_iter()
            .fold(self, |query, (key, value)| query.attribute(key, value))
    }

    /// Evaluates the query against one entry.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.issuer_id
            .as_ref()
            .map_or(true, |issuer| &entry.issuer_id == issuer)
            && self
                .credential_type
                .as_ref()
                .map_or(true, |kind| &entry.credential_type == kind)
            && self
                .credential_id
                .as_ref()
                .map_or(true, |id| &entry.credential_id == id)
            && self
                .attributes
                .iter()
                .all(|p| entry.indexed_attributes.contains(&p.key, &p.value))
    }
}

/// Ledger fields supplied by the issuance pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewIssuance {
    pub credential_id: String,
    pub issuer_id: String,
    pub credential_type: String,
    pub issue_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub indexed_attributes: IndexedAttributes,
}

pub struct IssuanceLedger {
    repo: Arc<dyn LedgerRepository>,
}

impl IssuanceLedger {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    /// Creates the ledger entry of a credential.
    pub async fn record(
        &self,
        issuance: NewIssuance,
        bindings: Vec<StatusBinding>,
    ) -> Result<LedgerEntry, StatusError> {
        for (i, binding) in bindings.iter().enumerate() {
            if bindings[..i].iter().any(|b| b.purpose == binding.purpose) {
                return Err(StatusError::DuplicateBinding {
                    credential_id: issuance.credential_id,
                    purpose: binding.purpose,
                });
            }
        }

        let credential_id = issuance.credential_id.clone();
        let entry = LedgerEntry {
            credential_id: issuance.credential_id,
            issuer_id: issuance.issuer_id,
            credential_type: issuance.credential_type,
            issue_date: issuance.issue_date,
            expiration_date: issuance.expiration_date,
            indexed_attributes: issuance.indexed_attributes,
            status_bindings: StatusBindings(bindings),
            created_at: Utc::now(),
        };

        match self.repo.insert(entry).await {
            Ok(entry) => {
                tracing::info!("Recorded credential {credential_id} in the ledger");
                Ok(entry)
            }
            Err(RepositoryError::Duplicate) => Err(StatusError::DuplicateCredential(credential_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a binding for a purpose the credential does not have yet.
    pub async fn add_binding(
        &self,
        credential_id: &str,
        binding: StatusBinding,
    ) -> Result<LedgerEntry, StatusError> {
        let purpose = binding.purpose;
        match self.repo.append_binding(credential_id, binding).await {
            Ok(entry) => Ok(entry),
            Err(RepositoryError::Duplicate) => Err(StatusError::DuplicateBinding {
                credential_id: credential_id.to_owned(),
                purpose,
            }),
            Err(RepositoryError::NotFound) => {
                Err(StatusError::LedgerEntryNotFound(credential_id.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<LedgerEntry>, StatusError> {
        Ok(self.repo.find(credential_id).await?)
    }

    pub async fn search(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StatusError> {
        Ok(self.repo.search(query).await?)
    }

    /// Which credential owns a bit of a page.
    pub async fn find_by_binding(
        &self,
        page_id: &str,
        index: i64,
    ) -> Result<Option<LedgerEntry>, StatusError> {
        Ok(self.repo.find_by_binding(page_id, index).await?)
    }
}

/// Credential type as stored in the ledger.
///
/// Multiple types are sorted and joined with commas.
pub fn credential_type_of(credential: &Value) -> String {
    match credential.get("type") {
        Some(Value::Array(types)) => {
            let mut types: Vec<&str> = types
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if types.is_empty() {
                return DEFAULT_CREDENTIAL_TYPE.to_owned();
            }
            types.sort_unstable();
            types.join(",")
        }
        Some(Value::String(kind)) if !kind.trim().is_empty() => kind.trim().to_owned(),
        _ => DEFAULT_CREDENTIAL_TYPE.to_owned(),
    }
}

/// Builds the searchable attributes of a credential.
///
/// `mappings` maps a target key to `|` separated JSONPath expressions such as
/// `$.credentialSubject.category|$.category`. The first path with a usable
/// value wins. A path matching several nodes yields them as an array.
pub fn extract_indexed_attributes(
    credential: &Value,
    mappings: &BTreeMap<String, String>,
) -> IndexedAttributes {
    let mut attributes = BTreeMap::new();
    for (key, paths) in mappings {
        let found = paths
            .split('|')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .find_map(|path| query(credential, key, path));
        match found {
            Some(value) => {
                attributes.insert(key.clone(), value);
            }
            None => tracing::debug!("No value found for indexed attribute {key}"),
        }
    }
    IndexedAttributes(attributes)
}

fn query(credential: &Value, key: &str, path: &str) -> Option<Value> {
    let Ok(json_path) = JsonPath::parse(path) else {
        tracing::warn!("Invalid JSONPath {path} for indexed attribute {key}");
        return None;
    };
    match json_path.query(credential).all().as_slice() {
        [] => None,
        [node] => usable(node),
        nodes => usable(&Value::Array(nodes.iter().map(|n| (*n).clone()).collect())),
    }
}

fn usable(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) if items.len() == 1 => usable(&items[0]),
        other => Some(other.clone()),
    }
}
