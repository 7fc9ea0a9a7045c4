use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    /// Catalog data for a relation could not be supplied. The planner treats
    /// this as degraded, not fatal.
    #[error("Catalog unavailable for relation '{relation}': {reason}")]
    CatalogUnavailable { relation: String, reason: String },

    // Stores may map their own I/O failures into this variant.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Duplicate key {key} violates unique index on {relation}.{field}")]
    DuplicateKey {
        relation: String,
        field: String,
        key: String,
    },

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    pub fn catalog_unavailable(relation: &str, reason: impl Into<String>) -> Self {
        Error::CatalogUnavailable {
            relation: relation.to_string(),
            reason: reason.into(),
        }
    }
}
