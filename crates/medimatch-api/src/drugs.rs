//! Handlers for `/drugs` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/drugs/search` | `?q=` required; matched after normalization |
//! | `GET`  | `/drugs/{id}/side-effects` | Side-effect names; empty for unknown drugs |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use medimatch_core::{
  catalog::Drug,
  store::{CatalogStore, FactSource, TermExtractor},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Search ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub q: Option<String>,
}

/// `GET /drugs/search?q=<text>`
pub async fn search<S, E>(
  State(state): State<AppState<S, E>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Drug>>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let q = params
    .q
    .ok_or_else(|| ApiError::BadRequest("missing query parameter `q`".into()))?;
  let drugs = state.service.search_drugs(&q).await?;
  Ok(Json(drugs))
}

// ─── Side effects ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SideEffectsResponse {
  pub drug_id:      String,
  /// Ordered by name.
  pub side_effects: Vec<String>,
}

/// `GET /drugs/{id}/side-effects`
pub async fn side_effects<S, E>(
  State(state): State<AppState<S, E>>,
  Path(drug_id): Path<String>,
) -> Result<Json<SideEffectsResponse>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let side_effects = state.service.side_effects(&drug_id).await?;
  Ok(Json(SideEffectsResponse {
    drug_id,
    side_effects: side_effects.into_iter().map(|s| s.name).collect(),
  }))
}
