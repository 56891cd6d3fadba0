//! Handlers for `/symptoms` endpoints: symptom → drug reverse lookups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/symptoms` | `?terms=` comma-separated; optional `limit` per term |
//! | `GET`  | `/symptoms/analyze` | `?text=` free text, run through the term extractor |

use axum::{
  Json,
  extract::{Query, State},
};
use medimatch_core::store::{CatalogStore, FactSource, TermExtractor};
use medimatch_engine::SymptomSearch;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  /// Comma-separated, e.g. `headache,nausea`.
  pub terms: Option<String>,
  pub limit: Option<usize>,
}

/// `GET /symptoms?terms=a,b[&limit=50]`
pub async fn search<S, E>(
  State(state): State<AppState<S, E>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<SymptomSearch>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let terms: Vec<String> = params
    .terms
    .map(|s| s.split(',').map(|t| t.trim().to_owned()).collect())
    .unwrap_or_default();
  if terms.iter().all(String::is_empty) {
    return Err(ApiError::BadRequest("missing query parameter `terms`".into()));
  }

  let limit = state.limits.clamp(params.limit, state.limits.symptoms_per_term);
  let search = state.service.symptom_search(&terms, limit).await?;
  Ok(Json(search))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
  pub text:  Option<String>,
  pub limit: Option<usize>,
}

/// `GET /symptoms/analyze?text=<free text>[&limit=50]`
pub async fn analyze<S, E>(
  State(state): State<AppState<S, E>>,
  Query(params): Query<AnalyzeParams>,
) -> Result<Json<SymptomSearch>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let text = params
    .text
    .filter(|t| !t.trim().is_empty())
    .ok_or_else(|| ApiError::BadRequest("missing query parameter `text`".into()))?;

  let limit = state.limits.clamp(params.limit, state.limits.symptoms_per_term);
  let search = state
    .service
    .analyze_symptoms(state.extractor.as_ref(), &text, limit)
    .await?;
  Ok(Json(search))
}
