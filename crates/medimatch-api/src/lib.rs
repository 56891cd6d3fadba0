//! JSON REST API for MediMatch.
//!
//! Exposes an axum [`Router`] over a [`QueryService`], the
//! [`CorrelationBuilder`] that feeds it and a [`TermExtractor`] for free-text
//! symptom analysis. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", medimatch_api::api_router(state))
//! ```

pub mod admin;
pub mod correlations;
pub mod drugs;
pub mod error;
pub mod symptoms;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use medimatch_core::store::{CatalogStore, FactSource, TermExtractor};
use medimatch_engine::{CorrelationBuilder, QueryService};
use serde::{Deserialize, Serialize};

pub use error::ApiError;

/// Row limits applied when a request does not give its own.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryLimits {
  /// Cells returned by `/correlations` without `limit`.
  pub correlations:      usize,
  /// Upper bound on any requested `limit`.
  pub max_rows:          usize,
  /// Matches per term for the symptom endpoints.
  pub symptoms_per_term: usize,
}

impl Default for QueryLimits {
  fn default() -> Self { Self { correlations: 100, max_rows: 1000, symptoms_per_term: 50 } }
}

impl QueryLimits {
  /// The requested limit, or `default`, capped at `max_rows`.
  pub fn clamp(&self, requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).min(self.max_rows)
  }
}

/// Everything the handlers need. Cheap to clone.
pub struct AppState<S, E> {
  pub service:   QueryService<S>,
  pub builder:   CorrelationBuilder<S>,
  pub extractor: Arc<E>,
  pub limits:    QueryLimits,
}

impl<S, E> Clone for AppState<S, E> {
  fn clone(&self) -> Self {
    Self {
      service:   self.service.clone(),
      builder:   self.builder.clone(),
      extractor: Arc::clone(&self.extractor),
      limits:    self.limits,
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, E>(state: AppState<S, E>) -> Router<()>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  Router::new()
    // Direct lookups
    .route("/drugs/search", get(drugs::search::<S, E>))
    .route("/drugs/{id}/side-effects", get(drugs::side_effects::<S, E>))
    // Correlations
    .route("/correlations", get(correlations::list::<S, E>))
    .route("/correlations/drugs", get(correlations::drill_down::<S, E>))
    // Reverse lookups
    .route("/symptoms", get(symptoms::search::<S, E>))
    .route("/symptoms/analyze", get(symptoms::analyze::<S, E>))
    // Maintenance
    .route("/ingest", post(admin::ingest::<S, E>))
    .route("/index/rebuild", post(admin::rebuild::<S, E>))
    .route("/health", get(admin::health::<S, E>))
    .with_state(state)
}
