//! Full rebuilds of the correlation index.
//!
//! A build reads one fact snapshot, aggregates it on the blocking pool and
//! installs the result through [`IndexHandle`]. Nothing is installed unless
//! the build completes, so an interrupted or failed build leaves the previous
//! index serving. There is no incremental mode.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use chrono::Utc;
use medimatch_core::{correlation::aggregate, store::FactSource};

use crate::{
  Error, Result,
  index::{CorrelationIndex, IndexHandle},
};

/// Rebuilds the correlation index from a [`FactSource`].
///
/// At most one build runs at a time across all clones of a builder.
pub struct CorrelationBuilder<F> {
  source:   Arc<F>,
  index:    IndexHandle,
  building: Arc<AtomicBool>,
}

impl<F> Clone for CorrelationBuilder<F> {
  fn clone(&self) -> Self {
    Self {
      source:   Arc::clone(&self.source),
      index:    self.index.clone(),
      building: Arc::clone(&self.building),
    }
  }
}

/// Holds the "build in progress" marker; releases it on every exit path,
/// including cancellation of the build future.
struct BuildGuard<'a>(&'a AtomicBool);

impl<'a> BuildGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for BuildGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

impl<F> CorrelationBuilder<F>
where
  F: FactSource + 'static,
{
  pub fn new(source: Arc<F>, index: IndexHandle) -> Self {
    Self { source, index, building: Arc::new(AtomicBool::new(false)) }
  }

  pub fn is_building(&self) -> bool { self.building.load(Ordering::Acquire) }

  /// Recompute every cell and install the result as the next version.
  ///
  /// Fails with [`Error::BuildInProgress`] if another build is running.
  pub async fn rebuild(&self) -> Result<Arc<CorrelationIndex>> {
    let _guard = BuildGuard::acquire(&self.building).ok_or(Error::BuildInProgress)?;
    let started = Instant::now();

    let snapshot = self
      .source
      .fact_snapshot()
      .await
      .map_err(|e| Error::Source(Box::new(e)))?;
    let fact_rows = snapshot.side_effect_facts.len() + snapshot.target_facts.len();
    tracing::debug!(fact_rows, "fact snapshot taken");

    let cells = tokio::task::spawn_blocking(move || aggregate(&snapshot))
      .await
      .map_err(|e| Error::BuildAborted(e.to_string()))?;

    // Only one build holds the guard, so nobody else bumps the version.
    let version = self.index.current().version() + 1;
    let installed = self
      .index
      .install(CorrelationIndex::new(version, Some(Utc::now()), cells));

    tracing::info!(
      version,
      cells = installed.len(),
      fact_rows,
      fingerprint = installed.fingerprint(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "correlation index installed"
    );
    Ok(installed)
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::AtomicUsize,
    time::Duration,
  };

  use medimatch_core::catalog::{
    Drug, DrugSideEffectFact, DrugTargetFact, FactSnapshot, IngestBatch, SideEffect,
  };
  use medimatch_core::store::CatalogStore;
  use medimatch_store_sqlite::SqliteStore;
  use tokio::sync::Notify;

  use super::*;

  fn two_nsaids() -> IngestBatch {
    IngestBatch {
      drugs:             vec![Drug::new("D1", "Aspirin"), Drug::new("D2", "Ibuprofen")],
      side_effects:      vec![SideEffect::new("S1", "Nausea")],
      side_effect_facts: vec![
        DrugSideEffectFact::new("D1", "S1"),
        DrugSideEffectFact::new("D2", "S1"),
      ],
      target_facts:      vec![
        DrugTargetFact::new("D1", "P1"),
        DrugTargetFact::new("D2", "P1"),
      ],
    }
  }

  async fn seeded(batch: IngestBatch) -> (Arc<SqliteStore>, CorrelationBuilder<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store.ingest(batch).await.unwrap();
    let builder = CorrelationBuilder::new(Arc::clone(&store), IndexHandle::new());
    (store, builder)
  }

  #[derive(Debug, thiserror::Error)]
  #[error("snapshot unavailable")]
  struct Unavailable;

  /// Fails every snapshot after the first `ok_calls`.
  struct FlakySource {
    inner:    Arc<SqliteStore>,
    ok_calls: usize,
    calls:    AtomicUsize,
  }

  impl FactSource for FlakySource {
    type Error = Unavailable;

    async fn fact_snapshot(&self) -> Result<FactSnapshot, Unavailable> {
      if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
        self.inner.fact_snapshot().await.map_err(|_| Unavailable)
      } else {
        Err(Unavailable)
      }
    }
  }

  /// Blocks in `fact_snapshot` until released.
  struct GatedSource {
    entered: Notify,
    release: Notify,
  }

  impl FactSource for GatedSource {
    type Error = Unavailable;

    async fn fact_snapshot(&self) -> Result<FactSnapshot, Unavailable> {
      self.entered.notify_one();
      self.release.notified().await;
      Ok(FactSnapshot::default())
    }
  }

  #[tokio::test]
  async fn shared_target_and_side_effect_builds_a_cell() {
    let (_store, builder) = seeded(two_nsaids()).await;

    let index = builder.rebuild().await.unwrap();

    assert_eq!(index.version(), 1);
    let cell = index.get("P1", "S1").expect("P1 × S1 cell");
    assert_eq!(cell.side_effect_name, "Nausea");
    assert_eq!(cell.drug_count, 2);
    assert!(!builder.is_building());
  }

  #[tokio::test]
  async fn single_drug_cell_is_absent() {
    let mut batch = two_nsaids();
    batch.target_facts[1] = DrugTargetFact::new("D2", "P2");
    let (_store, builder) = seeded(batch).await;

    let index = builder.rebuild().await.unwrap();

    assert!(index.get("P1", "S1").is_none());
    assert!(index.is_empty());
  }

  #[tokio::test]
  async fn rebuild_over_unchanged_facts_is_identical() {
    let (_store, builder) = seeded(two_nsaids()).await;

    let first = builder.rebuild().await.unwrap();
    let second = builder.rebuild().await.unwrap();

    assert_eq!(second.version(), first.version() + 1);
    assert_eq!(first.cells(), second.cells());
    assert_eq!(first.fingerprint(), second.fingerprint());
  }

  #[tokio::test]
  async fn rebuild_picks_up_new_facts() {
    let (store, builder) = seeded(two_nsaids()).await;
    builder.rebuild().await.unwrap();

    store
      .ingest(IngestBatch {
        drugs: vec![Drug::new("D3", "Naproxen")],
        side_effect_facts: vec![DrugSideEffectFact::new("D3", "S1")],
        target_facts: vec![DrugTargetFact::new("D3", "P1")],
        ..Default::default()
      })
      .await
      .unwrap();
    let index = builder.rebuild().await.unwrap();

    assert_eq!(index.get("P1", "S1").map(|c| c.drug_count), Some(3));
  }

  #[tokio::test]
  async fn failed_build_keeps_previous_index() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store.ingest(two_nsaids()).await.unwrap();
    let handle = IndexHandle::new();
    let source = Arc::new(FlakySource {
      inner:    store,
      ok_calls: 1,
      calls:    AtomicUsize::new(0),
    });
    let builder = CorrelationBuilder::new(source, handle.clone());

    let good = builder.rebuild().await.unwrap();
    let err = builder.rebuild().await.unwrap_err();

    assert!(matches!(err, Error::Source(_)), "got {err}");
    let active = handle.current();
    assert_eq!(active.version(), good.version());
    assert_eq!(active.fingerprint(), good.fingerprint());
    assert!(!builder.is_building(), "marker must be released after failure");
  }

  #[tokio::test]
  async fn concurrent_rebuild_is_rejected() {
    let source = Arc::new(GatedSource { entered: Notify::new(), release: Notify::new() });
    let builder = CorrelationBuilder::new(Arc::clone(&source), IndexHandle::new());

    let running = {
      let builder = builder.clone();
      tokio::spawn(async move { builder.rebuild().await })
    };
    source.entered.notified().await;

    assert!(builder.is_building());
    let err = builder.rebuild().await.unwrap_err();
    assert!(matches!(err, Error::BuildInProgress));

    source.release.notify_one();
    let index = running.await.unwrap().unwrap();
    assert_eq!(index.version(), 1);
    assert!(!builder.is_building());
  }

  #[tokio::test]
  async fn cancelled_build_releases_marker_and_installs_nothing() {
    let source = Arc::new(GatedSource { entered: Notify::new(), release: Notify::new() });
    let handle = IndexHandle::new();
    let builder = CorrelationBuilder::new(Arc::clone(&source), handle.clone());

    let timed_out =
      tokio::time::timeout(Duration::from_millis(20), builder.rebuild()).await;

    assert!(timed_out.is_err());
    assert!(!builder.is_building());
    assert_eq!(handle.current().version(), 0);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn readers_never_observe_a_mixed_index() {
    let (store, builder) = seeded(two_nsaids()).await;
    let handle = builder.index.clone();
    let old = builder.rebuild().await.unwrap();

    // A larger second generation: many proteins shared by three drugs.
    let mut batch = IngestBatch {
      drugs: vec![Drug::new("D3", "Naproxen")],
      side_effect_facts: vec![DrugSideEffectFact::new("D3", "S1")],
      ..Default::default()
    };
    for p in 0..500 {
      for d in ["D1", "D2", "D3"] {
        batch.target_facts.push(DrugTargetFact::new(d, format!("Q{p:03}")));
      }
    }
    store.ingest(batch).await.unwrap();

    let readers: Vec<_> = (0..4)
      .map(|_| {
        let handle = handle.clone();
        tokio::spawn(async move {
          let mut seen = Vec::new();
          for _ in 0..200 {
            let index = handle.current();
            seen.push((index.version(), index.fingerprint().to_owned(), index.len()));
            tokio::task::yield_now().await;
          }
          seen
        })
      })
      .collect();

    let new = builder.rebuild().await.unwrap();

    for reader in readers {
      for (version, fingerprint, len) in reader.await.unwrap() {
        if version == old.version() {
          assert_eq!(fingerprint, old.fingerprint());
          assert_eq!(len, old.len());
        } else {
          assert_eq!(version, new.version());
          assert_eq!(fingerprint, new.fingerprint());
          assert_eq!(len, new.len());
        }
      }
    }
    assert_eq!(new.len(), 501);
  }
}
