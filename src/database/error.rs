use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("entity already exists")]
    Duplicate,
    #[error("entity not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl RepositoryError {
    /// Maps unique constraint violations to [`RepositoryError::Duplicate`].
    pub(crate) fn from_insert(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => RepositoryError::Duplicate,
            _ => RepositoryError::Database(err),
        }
    }
}
