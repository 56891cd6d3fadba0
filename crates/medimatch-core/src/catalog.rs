//! Catalog types — the base relations the correlation index is derived from.
//!
//! Drugs and side effects are immutable once ingested. Facts relate them
//! (and protein targets, which only exist as an attribute of a fact) and are
//! unique on their composite key, so ingesting the same batch twice is a
//! no-op.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

// ─── Entities ────────────────────────────────────────────────────────────────

/// Which catalog entity an id refers to. Used in conflict reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Drug,
  SideEffect,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Drug => f.write_str("drug"),
      Self::SideEffect => f.write_str("side effect"),
    }
  }
}

/// A drug, keyed by its stable external id (e.g. a STITCH compound id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Drug {
  pub drug_id: String,
  pub name:    String,
}

impl Drug {
  pub fn new(drug_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self { drug_id: drug_id.into(), name: name.into() }
  }
}

/// A side effect, keyed by its concept id (e.g. a UMLS CUI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SideEffect {
  pub side_effect_id: String,
  pub name:           String,
}

impl SideEffect {
  pub fn new(side_effect_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self { side_effect_id: side_effect_id.into(), name: name.into() }
  }
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// A drug is known to cause a side effect.
///
/// `is_combination` marks facts derived from combination-therapy data. It is
/// metadata only and never changes how correlations are counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrugSideEffectFact {
  pub drug_id:        String,
  pub side_effect_id: String,
  #[serde(default)]
  pub is_combination: bool,
}

impl DrugSideEffectFact {
  pub fn new(drug_id: impl Into<String>, side_effect_id: impl Into<String>) -> Self {
    Self {
      drug_id:        drug_id.into(),
      side_effect_id: side_effect_id.into(),
      is_combination: false,
    }
  }

  pub fn combination(mut self) -> Self {
    self.is_combination = true;
    self
  }
}

/// A drug binds a protein target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrugTargetFact {
  pub drug_id:    String,
  pub protein_id: String,
}

impl DrugTargetFact {
  pub fn new(drug_id: impl Into<String>, protein_id: impl Into<String>) -> Self {
    Self { drug_id: drug_id.into(), protein_id: protein_id.into() }
  }
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

/// What an insert-or-ignore did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  Inserted,
  /// The row (or an identical one) was already present.
  Unchanged,
  /// A fact referenced a drug or side effect the catalog does not know. The
  /// fact was skipped.
  Orphaned,
}

/// A bulk ingestion unit. Entities are applied before facts, so a batch may
/// introduce a drug and its facts together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBatch {
  #[serde(default)]
  pub drugs:             Vec<Drug>,
  #[serde(default)]
  pub side_effects:      Vec<SideEffect>,
  #[serde(default)]
  pub side_effect_facts: Vec<DrugSideEffectFact>,
  #[serde(default)]
  pub target_facts:      Vec<DrugTargetFact>,
}

impl IngestBatch {
  pub fn is_empty(&self) -> bool {
    self.drugs.is_empty()
      && self.side_effects.is_empty()
      && self.side_effect_facts.is_empty()
      && self.target_facts.is_empty()
  }

  pub fn len(&self) -> usize {
    self.drugs.len()
      + self.side_effects.len()
      + self.side_effect_facts.len()
      + self.target_facts.len()
  }
}

/// Per-outcome row counts for one [`IngestBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
  pub inserted:  usize,
  pub unchanged: usize,
  pub orphaned:  usize,
}

impl IngestReport {
  pub fn count(&mut self, outcome: UpsertOutcome) {
    match outcome {
      UpsertOutcome::Inserted => self.inserted += 1,
      UpsertOutcome::Unchanged => self.unchanged += 1,
      UpsertOutcome::Orphaned => self.orphaned += 1,
    }
  }

  pub fn merge(&mut self, other: IngestReport) {
    self.inserted += other.inserted;
    self.unchanged += other.unchanged;
    self.orphaned += other.orphaned;
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// One hit of a reverse (symptom → drug) lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomMatch {
  /// The normalized term that produced this hit.
  pub term:        String,
  pub drug:        Drug,
  pub side_effect: SideEffect,
}

/// Row counts of the base relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
  pub drugs:             u64,
  pub side_effects:      u64,
  pub side_effect_facts: u64,
  pub target_facts:      u64,
}

/// A point-in-time copy of both fact tables, the input of a correlation
/// build.
#[derive(Debug, Clone, Default)]
pub struct FactSnapshot {
  pub side_effect_facts: Vec<DrugSideEffectFact>,
  pub target_facts:      Vec<DrugTargetFact>,
  /// Display names by side-effect id.
  pub side_effect_names: HashMap<String, String>,
}
