//! Error types for `medimatch-core`.

use thiserror::Error;

use crate::catalog::EntityKind;

#[derive(Debug, Error)]
pub enum Error {
  /// An ingestion tried to rename an existing catalog entity. Names are
  /// immutable once ingested; the caller has to reconcile the source data.
  #[error("{kind} {id} is already named {existing:?}, refusing {attempted:?}")]
  Conflict {
    kind:      EntityKind,
    id:        String,
    existing:  String,
    attempted: String,
  },

  #[error("unknown audit query type: {0:?}")]
  UnknownQueryType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
