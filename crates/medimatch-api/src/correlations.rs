//! Handlers for `/correlations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/correlations` | Optional `min_count` (at least 2) and `limit` |
//! | `GET`  | `/correlations/drugs` | `protein_id`, plus `side_effect_id` or a `side_effect` name |

use axum::{
  Json,
  extract::{Query, State},
};
use medimatch_core::{
  correlation::MIN_CORRELATION_COUNT,
  store::{CatalogStore, FactSource, TermExtractor},
};
use medimatch_engine::{CorrelationPage, DrillDown, SideEffectRef};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub min_count: Option<u32>,
  pub limit:     Option<usize>,
}

/// `GET /correlations[?min_count=2][&limit=100]`
pub async fn list<S, E>(
  State(state): State<AppState<S, E>>,
  Query(params): Query<ListParams>,
) -> Result<Json<CorrelationPage>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let limit = state.limits.clamp(params.limit, state.limits.correlations);
  let page = state
    .service
    .correlations(params.min_count.unwrap_or(MIN_CORRELATION_COUNT), Some(limit));
  Ok(Json(page))
}

// ─── Drill-down ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DrillDownParams {
  pub protein_id:     Option<String>,
  /// Preferred over `side_effect` when both are given.
  pub side_effect_id: Option<String>,
  /// Side-effect display name. Rejected when it names several cells.
  pub side_effect:    Option<String>,
}

/// `GET /correlations/drugs?protein_id=<id>&side_effect_id=<id>`
/// or `GET /correlations/drugs?protein_id=<id>&side_effect=<name>`
pub async fn drill_down<S, E>(
  State(state): State<AppState<S, E>>,
  Query(params): Query<DrillDownParams>,
) -> Result<Json<DrillDown>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let Some(protein_id) = params.protein_id else {
    return Err(ApiError::BadRequest("`protein_id` is required".into()));
  };
  let side_effect = match (&params.side_effect_id, &params.side_effect) {
    (Some(id), _) => SideEffectRef::Id(id),
    (None, Some(name)) => SideEffectRef::Name(name),
    (None, None) => {
      return Err(ApiError::BadRequest(
        "one of `side_effect_id` or `side_effect` is required".into(),
      ));
    }
  };
  let drill = state.service.drill_down(&protein_id, side_effect).await?;
  Ok(Json(drill))
}
