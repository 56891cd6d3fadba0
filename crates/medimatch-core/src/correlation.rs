//! The correlation aggregation kernel.
//!
//! A correlation cell says "`drug_count` distinct drugs both bind protein
//! `protein_id` and cause side effect `side_effect_id`". Cells are derived
//! from the two fact tables by join → group → filter and are never a source
//! of truth: they can be thrown away and rebuilt at any time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::catalog::FactSnapshot;

/// A single drug produces no signal; a cell needs at least this many.
pub const MIN_CORRELATION_COUNT: u32 = 2;

/// One aggregate row of the correlation index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationCell {
  pub protein_id:       String,
  pub side_effect_id:   String,
  pub side_effect_name: String,
  pub drug_count:       u32,
}

/// Compute every cell with `drug_count >= MIN_CORRELATION_COUNT`.
///
/// Repeated fact rows are collapsed first, so each drug contributes at most
/// once per (protein, side effect) pair. The result is ordered by count
/// (descending), then protein id, then side-effect id; the order is total,
/// so equal snapshots always produce equal output.
pub fn aggregate(snapshot: &FactSnapshot) -> Vec<CorrelationCell> {
  let mut proteins_by_drug: HashMap<&str, HashSet<&str>> = HashMap::new();
  for fact in &snapshot.target_facts {
    proteins_by_drug
      .entry(fact.drug_id.as_str())
      .or_default()
      .insert(fact.protein_id.as_str());
  }

  let drug_side_effects: HashSet<(&str, &str)> = snapshot
    .side_effect_facts
    .iter()
    .map(|f| (f.drug_id.as_str(), f.side_effect_id.as_str()))
    .collect();

  let mut counts: HashMap<(&str, &str), u32> = HashMap::new();
  for (drug_id, side_effect_id) in drug_side_effects {
    let Some(proteins) = proteins_by_drug.get(drug_id) else {
      continue;
    };
    for protein_id in proteins {
      *counts.entry((*protein_id, side_effect_id)).or_default() += 1;
    }
  }

  let mut cells: Vec<CorrelationCell> = counts
    .into_iter()
    .filter(|(_, count)| *count >= MIN_CORRELATION_COUNT)
    .map(|((protein_id, side_effect_id), drug_count)| CorrelationCell {
      protein_id:       protein_id.to_owned(),
      side_effect_id:   side_effect_id.to_owned(),
      side_effect_name: snapshot
        .side_effect_names
        .get(side_effect_id)
        .cloned()
        .unwrap_or_else(|| side_effect_id.to_owned()),
      drug_count,
    })
    .collect();

  cells.sort_by(|a, b| {
    b.drug_count
      .cmp(&a.drug_count)
      .then_with(|| a.protein_id.cmp(&b.protein_id))
      .then_with(|| a.side_effect_id.cmp(&b.side_effect_id))
  });
  cells
}

/// SHA-256 over the canonical encoding of `cells`, hex encoded.
///
/// Two indexes with the same fingerprint hold the same cells in the same
/// order.
pub fn fingerprint(cells: &[CorrelationCell]) -> String {
  let mut hasher = Sha256::new();
  for cell in cells {
    hasher.update(cell.protein_id.as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(cell.side_effect_id.as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(cell.side_effect_name.as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(cell.drug_count.to_be_bytes());
    hasher.update([0x1e_u8]);
  }
  hex::encode(hasher.finalize())
}
