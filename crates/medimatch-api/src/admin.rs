//! Maintenance endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/ingest` | Body: [`IngestBatch`]; 409 if a name conflicts, nothing applied |
//! | `POST` | `/index/rebuild` | Runs a full rebuild; 409 if one is already running |
//! | `GET`  | `/health` | Catalog counts, active index, audit counters |

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use medimatch_core::{
  catalog::{CatalogCounts, IngestBatch, IngestReport},
  store::{CatalogStore, FactSource, TermExtractor},
};
use medimatch_engine::{AuditStats, CorrelationIndex};
use serde::Serialize;

use crate::{AppState, error::ApiError};

/// Identity of one installed index version.
#[derive(Debug, Serialize)]
pub struct IndexSummary {
  pub version:     u64,
  pub cells:       usize,
  pub fingerprint: String,
  pub built_at:    Option<DateTime<Utc>>,
}

impl From<&CorrelationIndex> for IndexSummary {
  fn from(index: &CorrelationIndex) -> Self {
    Self {
      version:     index.version(),
      cells:       index.len(),
      fingerprint: index.fingerprint().to_owned(),
      built_at:    index.built_at(),
    }
  }
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

/// `POST /ingest`
pub async fn ingest<S, E>(
  State(state): State<AppState<S, E>>,
  Json(batch): Json<IngestBatch>,
) -> Result<Json<IngestReport>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let report = state.service.ingest(batch).await?;
  Ok(Json(report))
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

/// `POST /index/rebuild` — waits for the build and returns the new index.
pub async fn rebuild<S, E>(
  State(state): State<AppState<S, E>>,
) -> Result<Json<IndexSummary>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let index = state.builder.rebuild().await?;
  Ok(Json(IndexSummary::from(index.as_ref())))
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Health {
  pub status:   &'static str,
  pub catalog:  CatalogCounts,
  pub index:    IndexSummary,
  pub building: bool,
  pub audit:    AuditStats,
}

/// `GET /health`
pub async fn health<S, E>(State(state): State<AppState<S, E>>) -> Result<Json<Health>, ApiError>
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  let catalog = state.service.counts().await?;
  let index = state.service.index().current();

  Ok(Json(Health {
    status: "ok",
    catalog,
    index: IndexSummary::from(index.as_ref()),
    building: state.builder.is_building(),
    audit: state.service.audit().stats(),
  }))
}
