//! Storage traits.
//!
//! Backends (e.g. `medimatch-store-sqlite`) implement these; the engine and
//! the HTTP layer depend on the traits only. The catalog, the fact snapshot
//! used by correlation builds and the audit sink are separate traits so each
//! consumer asks for no more than it uses.

use std::{collections::HashSet, future::Future};

use crate::{
  audit::AuditRecord,
  catalog::{
    CatalogCounts, Drug, DrugSideEffectFact, DrugTargetFact, FactSnapshot,
    IngestBatch, IngestReport, SideEffect, SymptomMatch, UpsertOutcome,
  },
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Implemented by backend error types so callers can tell a catalog
/// [`Conflict`](crate::Error::Conflict) apart from an I/O failure without
/// knowing the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The core error wrapped by this backend error, if any.
  fn core(&self) -> Option<&crate::Error>;

  fn is_conflict(&self) -> bool { self.core().is_some_and(crate::Error::is_conflict) }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The base relations: drugs, side effects and the facts relating them.
///
/// Every write is an insert-or-ignore. Entity names are immutable: the only
/// write error a backend reports on its own is a conflict on an existing id.
pub trait CatalogStore: Send + Sync {
  type Error: StoreError;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a drug. Re-inserting the same `(id, name)` is `Unchanged`; the
  /// same id with another name is a conflict.
  fn upsert_drug(
    &self,
    drug: Drug,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Insert a side effect, with the same rules as [`Self::upsert_drug`].
  fn upsert_side_effect(
    &self,
    side_effect: SideEffect,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Insert a drug → side effect fact. Duplicates are `Unchanged`; a fact
  /// referencing an unknown drug or side effect is `Orphaned`.
  fn upsert_side_effect_fact(
    &self,
    fact: DrugSideEffectFact,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Insert a drug → protein target fact. An unknown drug is `Orphaned`.
  fn upsert_target_fact(
    &self,
    fact: DrugTargetFact,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Apply a whole batch atomically: either every row is applied under the
  /// rules above, or (on a conflict) nothing is.
  fn ingest(
    &self,
    batch: IngestBatch,
  ) -> impl Future<Output = Result<IngestReport, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Side effects of a drug, ordered by name. Empty for an unknown drug.
  fn side_effects_for_drug<'a>(
    &'a self,
    drug_id: &'a str,
  ) -> impl Future<Output = Result<Vec<SideEffect>, Self::Error>> + Send + 'a;

  /// Drugs whose normalized name contains `key`, ordered by name.
  ///
  /// `key` must already be normalized. An empty key matches nothing.
  fn drugs_matching_name<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Vec<Drug>, Self::Error>> + Send + 'a;

  /// Distinct (drug, side effect) pairs whose normalized side-effect name
  /// contains `key`, at most `limit` of them.
  fn drugs_with_side_effect_matching<'a>(
    &'a self,
    key: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<SymptomMatch>, Self::Error>> + Send + 'a;

  /// Drugs that both target `protein_id` and cause `side_effect_id`,
  /// ordered by name.
  fn drugs_for_correlation<'a>(
    &'a self,
    protein_id: &'a str,
    side_effect_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Drug>, Self::Error>> + Send + 'a;

  /// Ids of every drug in the catalog.
  fn drug_ids(
    &self,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  /// Row counts of the base relations.
  fn counts(
    &self,
  ) -> impl Future<Output = Result<CatalogCounts, Self::Error>> + Send + '_;
}

// ─── Fact snapshots ──────────────────────────────────────────────────────────

/// Source of the point-in-time fact copy a correlation build works from.
pub trait FactSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read both fact tables and side-effect names as one consistent snapshot.
  fn fact_snapshot(
    &self,
  ) -> impl Future<Output = Result<FactSnapshot, Self::Error>> + Send + '_;
}

// ─── Audit sink ──────────────────────────────────────────────────────────────

/// Durable, append-only destination for audit records.
pub trait AuditSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn append(
    &self,
    record: AuditRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── External term extraction ────────────────────────────────────────────────

/// The external semantic service that maps free text ("my head hurts and I
/// feel sick") to candidate medical terms ("Headache", "Nausea").
///
/// Implementations should not fail: an unreachable service yields no terms.
pub trait TermExtractor: Send + Sync {
  fn extract_terms<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Vec<String>> + Send + 'a;
}
