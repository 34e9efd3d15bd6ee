//! Engine errors.

use docflow_store::StoreError;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// Referenced execution, step or definition does not exist.
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  /// The operation is not allowed from the current state.
  #[error("invalid transition: {message}")]
  InvalidTransition { message: String },

  /// The request itself is malformed.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// The store failed.
  #[error(transparent)]
  Store(StoreError),
}

impl EngineError {
  pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    EngineError::NotFound {
      entity,
      id: id.into(),
    }
  }

  pub(crate) fn invalid_transition(message: impl Into<String>) -> Self {
    EngineError::InvalidTransition {
      message: message.into(),
    }
  }

  pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
    EngineError::InvalidInput {
      message: message.into(),
    }
  }

  /// HTTP status a control endpoint should answer with.
  pub fn status_code(&self) -> u16 {
    match self {
      EngineError::NotFound { .. } => 404,
      EngineError::InvalidTransition { .. } | EngineError::InvalidInput { .. } => 400,
      EngineError::Store(_) => 500,
    }
  }
}

impl From<StoreError> for EngineError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
      other => EngineError::Store(other),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_store_not_found_becomes_engine_not_found() {
    let err: EngineError = StoreError::NotFound {
      entity: "step",
      id: "s1".to_string(),
    }
    .into();
    assert!(matches!(err, EngineError::NotFound { entity: "step", .. }));
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.to_string(), "step not found: s1");
  }

  #[test]
  fn test_status_codes() {
    assert_eq!(EngineError::invalid_transition("x").status_code(), 400);
    assert_eq!(EngineError::invalid_input("x").status_code(), 400);
    let db: EngineError = StoreError::Database(sqlx::Error::PoolClosed).into();
    assert_eq!(db.status_code(), 500);
  }
}
