//! The query facade used by the HTTP layer.
//!
//! Every query method computes its answer, mirrors it to the audit log and
//! returns it. Auditing is fire-and-forget: it cannot fail a query or change
//! its result.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use medimatch_core::{
  audit::{
    AuditPayload, CorrelationsAudit, DrillDownAudit, DrugSearchAudit,
    SideEffectsAudit, SymptomHit, SymptomSearchAudit,
  },
  catalog::{CatalogCounts, Drug, IngestBatch, IngestReport, SideEffect, SymptomMatch},
  correlation::{CorrelationCell, MIN_CORRELATION_COUNT},
  normalize::normalize,
  store::{CatalogStore, TermExtractor},
};
use serde::Serialize;

use crate::{
  Error, Result,
  audit::AuditLogger,
  index::IndexHandle,
  resolver::{DrillDown, DrillDownResolver, SideEffectRef},
};

/// One page of correlation cells, with the identity of the index version it
/// was read from.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationPage {
  pub index_version: u64,
  pub fingerprint:   String,
  pub built_at:      Option<DateTime<Utc>>,
  /// The effective threshold, after clamping.
  pub min_count:     u32,
  /// Cells at or above the threshold, before `limit` was applied.
  pub total:         usize,
  pub cells:         Vec<CorrelationCell>,
}

/// The outcome of a reverse (symptom → drug) lookup.
#[derive(Debug, Clone, Serialize)]
pub struct SymptomSearch {
  /// Normalized, de-duplicated terms that were searched.
  pub terms:   Vec<String>,
  pub matches: Vec<SymptomMatch>,
}

pub struct QueryService<S> {
  store:    Arc<S>,
  index:    IndexHandle,
  resolver: DrillDownResolver<S>,
  audit:    AuditLogger,
}

impl<S> Clone for QueryService<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      index:    self.index.clone(),
      resolver: self.resolver.clone(),
      audit:    self.audit.clone(),
    }
  }
}

impl<S: CatalogStore> QueryService<S> {
  pub fn new(store: Arc<S>, index: IndexHandle, audit: AuditLogger) -> Self {
    let resolver = DrillDownResolver::new(Arc::clone(&store), index.clone());
    Self { store, index, resolver, audit }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn index(&self) -> &IndexHandle { &self.index }

  pub fn audit(&self) -> &AuditLogger { &self.audit }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Apply one batch atomically. A conflict rejects the whole batch.
  pub async fn ingest(&self, batch: IngestBatch) -> Result<IngestReport> {
    let rows = batch.len();
    let report = self.store.ingest(batch).await.map_err(Error::catalog)?;
    tracing::info!(
      rows,
      inserted = report.inserted,
      unchanged = report.unchanged,
      orphaned = report.orphaned,
      "batch ingested"
    );
    Ok(report)
  }

  pub async fn counts(&self) -> Result<CatalogCounts> {
    self.store.counts().await.map_err(Error::catalog)
  }

  // ─── Direct lookups ────────────────────────────────────────────────────────

  /// Side effects of a drug, ordered by name. Unknown drugs yield nothing.
  pub async fn side_effects(&self, drug_id: &str) -> Result<Vec<SideEffect>> {
    let side_effects = self
      .store
      .side_effects_for_drug(drug_id)
      .await
      .map_err(Error::catalog)?;

    self.audit.record(
      drug_id,
      AuditPayload::SideEffects(SideEffectsAudit {
        drug_id:      drug_id.to_owned(),
        side_effects: side_effects.iter().map(|s| s.name.clone()).collect(),
      }),
    );
    Ok(side_effects)
  }

  /// Drugs whose name contains `text`, compared by normalization key.
  pub async fn search_drugs(&self, text: &str) -> Result<Vec<Drug>> {
    let key = normalize(text);
    let drugs = if key.is_empty() {
      Vec::new()
    } else {
      self.store.drugs_matching_name(&key).await.map_err(Error::catalog)?
    };

    self.audit.record(
      text,
      AuditPayload::DrugSearch(DrugSearchAudit {
        key,
        drug_ids: drugs.iter().map(|d| d.drug_id.clone()).collect(),
      }),
    );
    Ok(drugs)
  }

  // ─── Correlation queries ───────────────────────────────────────────────────

  /// Cells of the active index with at least `min_count` drugs.
  ///
  /// `min_count` is raised to the index threshold if lower. Reads a single
  /// index version from start to finish.
  pub fn correlations(&self, min_count: u32, limit: Option<usize>) -> CorrelationPage {
    let min_count = min_count.max(MIN_CORRELATION_COUNT);
    let index = self.index.current();

    let total = index.cells_at_least(min_count).count();
    let cells: Vec<CorrelationCell> = index
      .cells_at_least(min_count)
      .take(limit.unwrap_or(usize::MAX))
      .cloned()
      .collect();

    self.audit.record(
      format!("min_count={min_count}"),
      AuditPayload::Correlations(CorrelationsAudit {
        min_count,
        index_version: index.version(),
        returned: cells.len(),
      }),
    );

    CorrelationPage {
      index_version: index.version(),
      fingerprint: index.fingerprint().to_owned(),
      built_at: index.built_at(),
      min_count,
      total,
      cells,
    }
  }

  /// The drugs behind the cell (`protein_id`, `side_effect`). Empty when the
  /// pair is not a cell of the active index.
  ///
  /// A name matching several cells of the protein is
  /// [`Error::AmbiguousSideEffect`]; ids always identify one cell.
  pub async fn drill_down(
    &self,
    protein_id: &str,
    side_effect: SideEffectRef<'_>,
  ) -> Result<DrillDown> {
    let drill = self.resolver.drugs_for(protein_id, side_effect).await?;

    self.audit.record(
      format!("{protein_id} / {}", side_effect.as_str()),
      AuditPayload::DrillDown(DrillDownAudit {
        protein_id:     protein_id.to_owned(),
        side_effect:    side_effect.as_str().to_owned(),
        side_effect_id: drill.cell.as_ref().map(|c| c.side_effect_id.clone()),
        index_version:  drill.index_version,
        drugs:          drill.drugs.iter().map(|d| d.name.clone()).collect(),
      }),
    );
    Ok(drill)
  }

  // ─── Reverse lookups ───────────────────────────────────────────────────────

  /// Drugs known to cause any of `terms`, at most `per_term_limit` hits per
  /// term.
  pub async fn symptom_search(
    &self,
    terms: &[String],
    per_term_limit: usize,
  ) -> Result<SymptomSearch> {
    let search = self.lookup_symptoms(terms, per_term_limit).await?;
    self.audit_symptoms(terms.join(", "), &search);
    Ok(search)
  }

  /// Extract symptom terms from free text, then search them like
  /// [`Self::symptom_search`]. The raw text is what gets audited.
  pub async fn analyze_symptoms<E: TermExtractor>(
    &self,
    extractor: &E,
    text: &str,
    per_term_limit: usize,
  ) -> Result<SymptomSearch> {
    let terms = extractor.extract_terms(text).await;
    tracing::debug!(extracted = terms.len(), "symptom terms extracted");

    let search = self.lookup_symptoms(&terms, per_term_limit).await?;
    self.audit_symptoms(text.to_owned(), &search);
    Ok(search)
  }

  async fn lookup_symptoms(&self, terms: &[String], per_term_limit: usize) -> Result<SymptomSearch> {
    let mut keys: Vec<String> = Vec::new();
    for term in terms {
      let key = normalize(term);
      if !key.is_empty() && !keys.contains(&key) {
        keys.push(key);
      }
    }

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for key in &keys {
      let hits = self
        .store
        .drugs_with_side_effect_matching(key, per_term_limit)
        .await
        .map_err(Error::catalog)?;
      for hit in hits {
        // Overlapping terms ("pain", "back pain") can find the same pair.
        if seen.insert((hit.drug.drug_id.clone(), hit.side_effect.side_effect_id.clone())) {
          matches.push(hit);
        }
      }
    }

    Ok(SymptomSearch { terms: keys, matches })
  }

  fn audit_symptoms(&self, input_text: String, search: &SymptomSearch) {
    self.audit.record(
      input_text,
      AuditPayload::SymptomSearch(SymptomSearchAudit {
        terms:   search.terms.clone(),
        matches: search
          .matches
          .iter()
          .map(|m| SymptomHit {
            drug:        m.drug.name.clone(),
            side_effect: m.side_effect.name.clone(),
          })
          .collect(),
      }),
    );
  }
}
