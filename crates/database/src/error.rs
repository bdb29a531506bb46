use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{} with id {} not found", entity, id))
    }
}

/// Errors surfaced by the schema manager.
///
/// Every `cause` string has already been passed through
/// [`crate::sanitize::sanitize_error`] so connection-string credentials never
/// leak into logs or API responses.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid tenant slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error("Invalid schema name '{name}': {reason}")]
    InvalidSchemaName { name: String, reason: String },

    #[error("Failed to create schema '{schema_name}': {cause}")]
    CreateFailed { schema_name: String, cause: String },

    #[error("Failed to migrate schema '{schema_name}': {cause}")]
    MigrateFailed { schema_name: String, cause: String },

    #[error("Failed to delete schema '{schema_name}': {cause}")]
    DeleteFailed { schema_name: String, cause: String },

    #[error("Schema '{schema_name}' not found")]
    NotFound { schema_name: String },

    #[error("Schema manager configuration error: {0}")]
    Config(String),
}

impl SchemaError {
    pub fn invalid_slug(slug: &str, reason: &str) -> Self {
        Self::InvalidSlug {
            slug: slug.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_schema_name(name: &str, reason: &str) -> Self {
        Self::InvalidSchemaName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
