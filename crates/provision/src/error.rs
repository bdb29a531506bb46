use pgtenant_database::{DatabaseError, SchemaError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<validator::ValidationErrors> for ProvisionError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProvisionError::Validation(err.to_string())
    }
}
