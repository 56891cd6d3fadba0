//! The active correlation index and the handle that swaps it.
//!
//! A [`CorrelationIndex`] is immutable once built. [`IndexHandle`] is the
//! single current-version pointer: readers clone an `Arc` to whichever index
//! is active, the builder replaces it in one step. A reader therefore holds
//! either the old or the new index for as long as it likes, never a mix.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use medimatch_core::{
  correlation::{CorrelationCell, fingerprint},
  normalize::normalize,
};
use tokio::sync::watch;

// ─── CorrelationIndex ────────────────────────────────────────────────────────

/// One immutable version of the correlation cell set.
#[derive(Debug)]
pub struct CorrelationIndex {
  version:     u64,
  built_at:    Option<DateTime<Utc>>,
  fingerprint: String,
  cells:       Vec<CorrelationCell>,
  /// (protein id, side-effect id) → position in `cells`.
  by_id:       HashMap<(String, String), usize>,
  /// (protein id, normalized side-effect name) → positions in `cells`.
  /// Distinct side effects can share a normalized name.
  by_name:     HashMap<(String, String), Vec<usize>>,
}

impl CorrelationIndex {
  /// The cold index a process starts with: version 0, no cells.
  pub fn empty() -> Self { Self::new(0, None, Vec::new()) }

  /// Wrap an already ordered cell list.
  pub fn new(
    version: u64,
    built_at: Option<DateTime<Utc>>,
    cells: Vec<CorrelationCell>,
  ) -> Self {
    let mut by_id = HashMap::with_capacity(cells.len());
    let mut by_name: HashMap<_, Vec<usize>> = HashMap::with_capacity(cells.len());
    for (pos, cell) in cells.iter().enumerate() {
      by_id.insert((cell.protein_id.clone(), cell.side_effect_id.clone()), pos);
      by_name
        .entry((cell.protein_id.clone(), normalize(&cell.side_effect_name)))
        .or_default()
        .push(pos);
    }

    Self {
      version,
      built_at,
      fingerprint: fingerprint(&cells),
      cells,
      by_id,
      by_name,
    }
  }

  pub fn version(&self) -> u64 { self.version }

  /// `None` for the cold index.
  pub fn built_at(&self) -> Option<DateTime<Utc>> { self.built_at }

  pub fn fingerprint(&self) -> &str { &self.fingerprint }

  /// All cells, ordered by count (descending), then protein and side-effect
  /// id.
  pub fn cells(&self) -> &[CorrelationCell] { &self.cells }

  pub fn len(&self) -> usize { self.cells.len() }

  pub fn is_empty(&self) -> bool { self.cells.is_empty() }

  pub fn get(&self, protein_id: &str, side_effect_id: &str) -> Option<&CorrelationCell> {
    self
      .by_id
      .get(&(protein_id.to_owned(), side_effect_id.to_owned()))
      .map(|&pos| &self.cells[pos])
  }

  /// Cells of `protein_id` whose side-effect name matches
  /// `side_effect_name` after normalization, in index order. More than one
  /// when distinct side effects normalize to the same name.
  pub fn cells_named(&self, protein_id: &str, side_effect_name: &str) -> Vec<&CorrelationCell> {
    self
      .by_name
      .get(&(protein_id.to_owned(), normalize(side_effect_name)))
      .map(|positions| positions.iter().map(|&pos| &self.cells[pos]).collect())
      .unwrap_or_default()
  }

  /// Cells with at least `min_count` drugs, in index order.
  pub fn cells_at_least(&self, min_count: u32) -> impl Iterator<Item = &CorrelationCell> {
    // Ordered by count descending, so the matching cells are a prefix.
    self.cells.iter().take_while(move |c| c.drug_count >= min_count)
  }
}

// ─── IndexHandle ─────────────────────────────────────────────────────────────

/// Shared pointer to the active [`CorrelationIndex`].
///
/// Cloning is cheap; all clones observe the same index.
#[derive(Clone)]
pub struct IndexHandle {
  current: Arc<watch::Sender<Arc<CorrelationIndex>>>,
}

impl IndexHandle {
  /// A handle pointing at the cold, empty index.
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(Arc::new(CorrelationIndex::empty()));
    Self { current: Arc::new(tx) }
  }

  /// The active index. The returned snapshot stays valid after later swaps.
  pub fn current(&self) -> Arc<CorrelationIndex> { self.current.borrow().clone() }

  /// Make `index` the active one and return it.
  pub(crate) fn install(&self, index: CorrelationIndex) -> Arc<CorrelationIndex> {
    let index = Arc::new(index);
    self.current.send_replace(Arc::clone(&index));
    index
  }

  /// Receive a notification for every installed version.
  pub fn subscribe(&self) -> watch::Receiver<Arc<CorrelationIndex>> {
    self.current.subscribe()
  }
}

impl Default for IndexHandle {
  fn default() -> Self { Self::new() }
}
