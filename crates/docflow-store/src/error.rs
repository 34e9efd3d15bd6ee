/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
  pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    StoreError::NotFound {
      entity,
      id: id.into(),
    }
  }
}
