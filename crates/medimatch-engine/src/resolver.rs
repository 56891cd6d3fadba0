//! Drill-down from a correlation cell to the drugs behind it.

use std::sync::Arc;

use medimatch_core::{
  catalog::Drug,
  correlation::CorrelationCell,
  store::CatalogStore,
};
use serde::Serialize;

use crate::{Error, Result, index::IndexHandle};

/// How the caller names the side effect of a cell.
#[derive(Debug, Clone, Copy)]
pub enum SideEffectRef<'a> {
  Id(&'a str),
  /// Display name, matched through the normalizer. Rejected when it matches
  /// more than one cell of the protein.
  Name(&'a str),
}

impl<'a> SideEffectRef<'a> {
  /// The id or name as given.
  pub fn as_str(&self) -> &'a str {
    match *self {
      Self::Id(s) | Self::Name(s) => s,
    }
  }
}

/// The answer to one drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct DrillDown {
  /// Version of the index the cell was looked up in.
  pub index_version: u64,
  /// `None` when the pair is not a cell of the active index.
  pub cell:          Option<CorrelationCell>,
  /// Ordered by name. Empty when `cell` is `None`.
  pub drugs:         Vec<Drug>,
}

/// Resolves (protein, side effect) pairs of the active index to drugs.
pub struct DrillDownResolver<S> {
  store: Arc<S>,
  index: IndexHandle,
}

impl<S> Clone for DrillDownResolver<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), index: self.index.clone() }
  }
}

impl<S: CatalogStore> DrillDownResolver<S> {
  pub fn new(store: Arc<S>, index: IndexHandle) -> Self { Self { store, index } }

  /// The drugs that both target `protein_id` and cause `side_effect`.
  ///
  /// Only pairs present in the active index are resolved; anything else
  /// (including pairs filtered out by the count threshold) yields no drugs.
  /// The drug set is read from the current catalog rather than derived from
  /// the cached count.
  pub async fn drugs_for(
    &self,
    protein_id: &str,
    side_effect: SideEffectRef<'_>,
  ) -> Result<DrillDown> {
    let index = self.index.current();
    let cell = match side_effect {
      SideEffectRef::Id(id) => index.get(protein_id, id),
      SideEffectRef::Name(name) => match index.cells_named(protein_id, name).as_slice() {
        [] => None,
        [cell] => Some(*cell),
        several => {
          return Err(Error::AmbiguousSideEffect {
            protein_id: protein_id.to_owned(),
            name:       name.to_owned(),
            candidates: several.iter().map(|c| c.side_effect_id.clone()).collect(),
          });
        }
      },
    }
    .cloned();

    let drugs = match &cell {
      Some(cell) => self
        .store
        .drugs_for_correlation(&cell.protein_id, &cell.side_effect_id)
        .await
        .map_err(Error::catalog)?,
      None => Vec::new(),
    };

    Ok(DrillDown { index_version: index.version(), cell, drugs })
  }
}

#[cfg(test)]
mod tests {
  use medimatch_core::catalog::{
    DrugSideEffectFact, DrugTargetFact, IngestBatch, SideEffect,
  };
  use medimatch_store_sqlite::SqliteStore;

  use super::*;
  use crate::builder::CorrelationBuilder;

  async fn setup() -> (Arc<SqliteStore>, CorrelationBuilder<SqliteStore>, DrillDownResolver<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store
      .ingest(IngestBatch {
        drugs:             vec![
          Drug::new("D1", "Aspirin"),
          Drug::new("D2", "Ibuprofen"),
          Drug::new("D3", "Naproxen"),
        ],
        side_effects:      vec![
          SideEffect::new("S1", "Nausea"),
          SideEffect::new("S2", "Headache"),
        ],
        side_effect_facts: vec![
          DrugSideEffectFact::new("D1", "S1"),
          DrugSideEffectFact::new("D2", "S1"),
          DrugSideEffectFact::new("D3", "S1").combination(),
          DrugSideEffectFact::new("D1", "S2"),
        ],
        target_facts:      vec![
          DrugTargetFact::new("D1", "P1"),
          DrugTargetFact::new("D2", "P1"),
          DrugTargetFact::new("D3", "P1"),
          DrugTargetFact::new("D1", "P2"),
          DrugTargetFact::new("D2", "P2"),
        ],
      })
      .await
      .unwrap();

    let handle = IndexHandle::new();
    let builder = CorrelationBuilder::new(Arc::clone(&store), handle.clone());
    let resolver = DrillDownResolver::new(Arc::clone(&store), handle);
    (store, builder, resolver)
  }

  #[tokio::test]
  async fn resolves_by_name_and_id() {
    let (_store, builder, resolver) = setup().await;
    builder.rebuild().await.unwrap();

    let by_name = resolver.drugs_for("P1", SideEffectRef::Name("nausea")).await.unwrap();
    let names: Vec<&str> = by_name.drugs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["Aspirin", "Ibuprofen", "Naproxen"]);
    assert_eq!(by_name.index_version, 1);

    let by_id = resolver.drugs_for("P1", SideEffectRef::Id("S1")).await.unwrap();
    assert_eq!(by_id.drugs, by_name.drugs);
  }

  #[tokio::test]
  async fn every_cell_resolves_to_exactly_its_count() {
    let (_store, builder, resolver) = setup().await;
    let index = builder.rebuild().await.unwrap();
    assert!(!index.is_empty());

    for cell in index.cells() {
      let resolved = resolver
        .drugs_for(&cell.protein_id, SideEffectRef::Id(&cell.side_effect_id))
        .await
        .unwrap();
      assert_eq!(resolved.drugs.len(), cell.drug_count as usize, "cell {cell:?}");
    }
  }

  #[tokio::test]
  async fn filtered_pair_resolves_to_nothing() {
    let (_store, builder, resolver) = setup().await;
    builder.rebuild().await.unwrap();

    // Only Aspirin links P1 to headache: count 1, below the threshold.
    let resolved = resolver.drugs_for("P1", SideEffectRef::Name("Headache")).await.unwrap();
    assert!(resolved.cell.is_none());
    assert!(resolved.drugs.is_empty());

    let unknown = resolver.drugs_for("P404", SideEffectRef::Id("S1")).await.unwrap();
    assert!(unknown.drugs.is_empty());
  }

  #[tokio::test]
  async fn colliding_names_resolve_by_id_and_reject_by_name() {
    let (store, builder, resolver) = setup().await;
    // "nausea." normalizes like "Nausea" but is a distinct side effect.
    store
      .ingest(IngestBatch {
        drugs: vec![Drug::new("D4", "Ketoprofen"), Drug::new("D5", "Diclofenac")],
        side_effects: vec![SideEffect::new("S3", "nausea.")],
        side_effect_facts: vec![
          DrugSideEffectFact::new("D4", "S3"),
          DrugSideEffectFact::new("D5", "S3"),
        ],
        target_facts: vec![DrugTargetFact::new("D4", "P1"), DrugTargetFact::new("D5", "P1")],
      })
      .await
      .unwrap();
    let index = builder.rebuild().await.unwrap();

    for cell in index.cells() {
      let resolved = resolver
        .drugs_for(&cell.protein_id, SideEffectRef::Id(&cell.side_effect_id))
        .await
        .unwrap();
      assert_eq!(resolved.drugs.len(), cell.drug_count as usize, "cell {cell:?}");
    }

    let weaker = resolver.drugs_for("P1", SideEffectRef::Id("S3")).await.unwrap();
    let names: Vec<&str> = weaker.drugs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["Diclofenac", "Ketoprofen"]);

    let err = resolver.drugs_for("P1", SideEffectRef::Name("Nausea")).await.unwrap_err();
    assert!(
      matches!(&err, Error::AmbiguousSideEffect { candidates, .. } if candidates == &["S1", "S3"]),
      "got {err}"
    );
  }

  #[tokio::test]
  async fn cold_index_resolves_to_nothing() {
    let (_store, _builder, resolver) = setup().await;

    let resolved = resolver.drugs_for("P1", SideEffectRef::Id("S1")).await.unwrap();
    assert_eq!(resolved.index_version, 0);
    assert!(resolved.drugs.is_empty());
  }

  #[tokio::test]
  async fn drugs_come_from_current_facts_not_cached_count() {
    let (store, builder, resolver) = setup().await;
    builder.rebuild().await.unwrap();

    store
      .ingest(IngestBatch {
        drugs: vec![Drug::new("D4", "Ketoprofen")],
        side_effect_facts: vec![DrugSideEffectFact::new("D4", "S1")],
        target_facts: vec![DrugTargetFact::new("D4", "P1")],
        ..Default::default()
      })
      .await
      .unwrap();

    let resolved = resolver.drugs_for("P1", SideEffectRef::Id("S1")).await.unwrap();
    assert_eq!(resolved.cell.map(|c| c.drug_count), Some(3));
    assert_eq!(resolved.drugs.len(), 4);
  }
}
