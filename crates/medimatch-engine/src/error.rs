//! Error types for `medimatch-engine`.

use medimatch_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Another rebuild holds the build marker. Rejected, not queued.
  #[error("a correlation build is already in progress")]
  BuildInProgress,

  /// The aggregation task died before producing an index. The previous
  /// index is still active.
  #[error("correlation build aborted: {0}")]
  BuildAborted(String),

  /// A side-effect name matched several cells of one protein. The caller
  /// has to pick one by side-effect id.
  #[error("side effect {name:?} is ambiguous for protein {protein_id}: one of {candidates:?}")]
  AmbiguousSideEffect {
    protein_id: String,
    name:       String,
    candidates: Vec<String>,
  },

  #[error("fact source error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("catalog error: {0}")]
  Catalog(Box<dyn StoreError>),
}

impl Error {
  pub(crate) fn catalog(e: impl StoreError) -> Self { Self::Catalog(Box::new(e)) }

  /// True when the underlying catalog rejected a rename.
  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::Catalog(e) if e.is_conflict())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
