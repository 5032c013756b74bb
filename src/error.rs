use thiserror::Error;

/// Caller-supplied data rejected before the store is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("dish name must not be empty")]
    EmptyName,
    #[error("base servings must be a positive whole number, got {0}")]
    InvalidServings(i64),
    #[error("at least one ingredient with a name and a positive quantity is required")]
    NoIngredients,
    #[error("target servings must be a positive number, got {0}")]
    InvalidTargetServings(f64),
}

/// The store rejected or failed to complete an operation.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("database connection unavailable: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("stored {table} row {id} is malformed: {reason}")]
    MalformedRow {
        table: &'static str,
        id: String,
        reason: String,
    },
}
