//! Offline bulk import of the Decagon / STITCH source files.
//!
//! | File | Format | Columns |
//! |------|--------|---------|
//! | drugs | tab-separated, no header | STITCH id, name |
//! | mono | comma-separated, header | STITCH id, side-effect id, side-effect name |
//! | combo | comma-separated, header | STITCH id 1, STITCH id 2, side-effect id, side-effect name |
//! | targets | comma-separated, header | STITCH id, gene / protein id |
//!
//! Files are parsed with the `csv` crate, so quoted fields and escaped quotes
//! follow RFC 4180. Names are the last column and, when unquoted, may still
//! contain the delimiter: trailing fields are joined back together. Fields
//! that are not valid UTF-8 are read as Latin-1. Malformed records are
//! skipped and counted.
//!
//! Rows are fed to the store in [`IngestBatch`]es; drugs first, so that facts
//! never race ahead of the catalog entries they reference. A combination row
//! is only kept when both of its drugs are already in the catalog.

use std::{
  borrow::Cow,
  collections::HashSet,
  path::{Path, PathBuf},
};

use csv::ByteRecord;
use medimatch_core::{
  catalog::{
    Drug, DrugSideEffectFact, DrugTargetFact, IngestBatch, IngestReport, SideEffect,
  },
  normalize::clean_display_name,
  store::{CatalogStore, StoreError},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
  #[error("failed to read {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("store rejected batch: {0}")]
  Store(Box<dyn StoreError>),
}

impl ImportError {
  fn store(e: impl StoreError) -> Self { Self::Store(Box::new(e)) }
}

/// The source files to import. Any of them may be omitted.
#[derive(Debug, Clone, Default)]
pub struct ImportSources {
  pub drugs:   Option<PathBuf>,
  pub mono:    Option<PathBuf>,
  pub combo:   Option<PathBuf>,
  pub targets: Option<PathBuf>,
}

/// Totals over one import run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportSummary {
  pub lines:    usize,
  /// Records that could not be parsed.
  pub skipped:  usize,
  /// Combination rows dropped because a drug is not in the catalog.
  pub filtered: usize,
  pub batches:  usize,
  pub rows:     IngestReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
  Drugs,
  Mono,
  Combo,
  Targets,
}

impl SourceKind {
  fn has_header(self) -> bool { self != Self::Drugs }

  fn delimiter(self) -> u8 {
    match self {
      Self::Drugs => b'\t',
      _ => b',',
    }
  }

  /// Fields a record needs at least.
  fn width(self) -> usize {
    match self {
      Self::Drugs | Self::Targets => 2,
      Self::Mono => 3,
      Self::Combo => 4,
    }
  }

  fn label(self) -> &'static str {
    match self {
      Self::Drugs => "drugs",
      Self::Mono => "mono side effects",
      Self::Combo => "combination side effects",
      Self::Targets => "targets",
    }
  }
}

/// What became of one record.
enum Row {
  Queued,
  Malformed,
  /// A combination row naming a drug the catalog does not have.
  UnknownDrug,
}

/// Import every file in `sources`, in dependency order.
pub async fn run<S: CatalogStore>(
  store: &S,
  sources: &ImportSources,
  batch_size: usize,
) -> Result<ImportSummary, ImportError> {
  let mut importer = Importer::new(store, batch_size);

  let ordered = [
    (SourceKind::Drugs, &sources.drugs),
    (SourceKind::Mono, &sources.mono),
    (SourceKind::Combo, &sources.combo),
    (SourceKind::Targets, &sources.targets),
  ];
  for (kind, path) in ordered {
    if let Some(path) = path {
      importer.import_file(kind, path).await?;
    }
  }

  Ok(importer.summary)
}

struct Importer<'a, S> {
  store:        &'a S,
  batch_size:   usize,
  batch:        IngestBatch,
  /// Side-effect ids already emitted this run. The first name seen wins.
  side_effects: HashSet<String>,
  /// Catalog drug ids, loaded before the combination file.
  known_drugs:  HashSet<String>,
  summary:      ImportSummary,
}

impl<'a, S: CatalogStore> Importer<'a, S> {
  fn new(store: &'a S, batch_size: usize) -> Self {
    Self {
      store,
      batch_size: batch_size.max(1),
      batch: IngestBatch::default(),
      side_effects: HashSet::new(),
      known_drugs: HashSet::new(),
      summary: ImportSummary::default(),
    }
  }

  async fn import_file(&mut self, kind: SourceKind, path: &Path) -> Result<(), ImportError> {
    // The csv reader is synchronous, so the file is read up front.
    let contents = tokio::fs::read(path)
      .await
      .map_err(|source| ImportError::Io { path: path.to_owned(), source })?;
    let mut reader = csv::ReaderBuilder::new()
      .has_headers(kind.has_header())
      .delimiter(kind.delimiter())
      .flexible(true)
      .from_reader(contents.as_slice());

    if kind == SourceKind::Combo {
      self.known_drugs = self.store.drug_ids().await.map_err(ImportError::store)?;
    }

    let before = self.summary;
    let mut record = ByteRecord::new();
    loop {
      let line = reader.position().line();
      match reader.read_byte_record(&mut record) {
        Ok(false) => break,
        Ok(true) => {}
        Err(e) => {
          self.summary.lines += 1;
          self.summary.skipped += 1;
          tracing::debug!(file = %path.display(), line, error = %e, "skipping unreadable record");
          continue;
        }
      }

      self.summary.lines += 1;
      match self.push_record(kind, &record) {
        Row::Queued => {}
        Row::Malformed => {
          self.summary.skipped += 1;
          tracing::debug!(file = %path.display(), line, "skipping malformed record");
        }
        Row::UnknownDrug => self.summary.filtered += 1,
      }
      if self.batch.len() >= self.batch_size {
        self.flush().await?;
      }
    }
    self.flush().await?;

    tracing::info!(
      source = kind.label(),
      file = %path.display(),
      lines = self.summary.lines - before.lines,
      skipped = self.summary.skipped - before.skipped,
      filtered = self.summary.filtered - before.filtered,
      inserted = self.summary.rows.inserted - before.rows.inserted,
      orphaned = self.summary.rows.orphaned - before.rows.orphaned,
      "file imported"
    );
    Ok(())
  }

  /// Parse one record into the pending batch.
  fn push_record(&mut self, kind: SourceKind, record: &ByteRecord) -> Row {
    if record.len() < kind.width() {
      return Row::Malformed;
    }
    let id = |i| clean_id(&field(record, i));

    match kind {
      SourceKind::Drugs => {
        let (drug, name) = (id(0), clean_display_name(&trailing(record, 1, kind)));
        if drug.is_empty() || name.is_empty() {
          return Row::Malformed;
        }
        self.batch.drugs.push(Drug::new(drug, name));
      }
      SourceKind::Mono => {
        let (drug, se_id) = (id(0), id(1));
        if drug.is_empty() || !self.push_side_effect(&se_id, &trailing(record, 2, kind)) {
          return Row::Malformed;
        }
        self.batch.side_effect_facts.push(DrugSideEffectFact::new(drug, se_id));
      }
      SourceKind::Combo => {
        let (first, second, se_id) = (id(0), id(1), id(2));
        let name = clean_display_name(&trailing(record, 3, kind));
        if first.is_empty() || second.is_empty() || se_id.is_empty() || name.is_empty() {
          return Row::Malformed;
        }
        if !self.known_drugs.contains(&first) || !self.known_drugs.contains(&second) {
          return Row::UnknownDrug;
        }
        self.push_side_effect(&se_id, &name);
        // The interaction's side effect is recorded for both drugs.
        self
          .batch
          .side_effect_facts
          .push(DrugSideEffectFact::new(first, se_id.clone()).combination());
        self
          .batch
          .side_effect_facts
          .push(DrugSideEffectFact::new(second, se_id).combination());
      }
      SourceKind::Targets => {
        let (drug, protein) = (id(0), id(1));
        if drug.is_empty() || protein.is_empty() {
          return Row::Malformed;
        }
        self.batch.target_facts.push(DrugTargetFact::new(drug, protein));
      }
    }
    Row::Queued
  }

  /// Queue the side-effect entity unless already emitted. `false` if the
  /// id or name is unusable.
  fn push_side_effect(&mut self, id: &str, raw_name: &str) -> bool {
    let name = clean_display_name(raw_name);
    if id.is_empty() || name.is_empty() {
      return false;
    }
    if self.side_effects.insert(id.to_owned()) {
      self.batch.side_effects.push(SideEffect::new(id, name));
    }
    true
  }

  async fn flush(&mut self) -> Result<(), ImportError> {
    if self.batch.is_empty() {
      return Ok(());
    }
    let batch = std::mem::take(&mut self.batch);
    let report = self.store.ingest(batch).await.map_err(ImportError::store)?;
    self.summary.rows.merge(report);
    self.summary.batches += 1;
    Ok(())
  }
}

// ─── Field helpers ───────────────────────────────────────────────────────────

fn decode(raw: &[u8]) -> Cow<'_, str> {
  match std::str::from_utf8(raw) {
    Ok(s) => Cow::Borrowed(s),
    Err(_) => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
  }
}

fn field(record: &ByteRecord, i: usize) -> Cow<'_, str> {
  record.get(i).map(decode).unwrap_or_default()
}

/// Fields `from..` joined back with the delimiter.
fn trailing(record: &ByteRecord, from: usize, kind: SourceKind) -> String {
  let delimiter = char::from(kind.delimiter()).to_string();
  record
    .iter()
    .skip(from)
    .map(decode)
    .collect::<Vec<_>>()
    .join(&delimiter)
}

/// Identifiers in the source files are sometimes quoted.
fn clean_id(raw: &str) -> String { raw.replace(['\'', '"'], "").trim().to_owned() }

#[cfg(test)]
mod tests {
  use std::io::Write;

  use medimatch_core::catalog::CatalogCounts;
  use medimatch_store_sqlite::SqliteStore;
  use tempfile::NamedTempFile;

  use super::*;

  fn fixture(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file
  }

  #[test]
  fn latin1_fields_are_decoded() {
    assert_eq!(decode(b"Sulfam\xe9thoxazole"), "Sulfaméthoxazole");
    assert_eq!(clean_id(" 'CID000002173' "), "CID000002173");
  }

  async fn side_effect_names(store: &SqliteStore, drug_id: &str) -> Vec<String> {
    store
      .side_effects_for_drug(drug_id)
      .await
      .unwrap()
      .into_iter()
      .map(|s| s.name)
      .collect()
  }

  #[tokio::test]
  async fn imports_all_four_files() {
    let drugs = fixture(b"CID1\t'Aspirin'\nCID2\tIbuprofen\r\nCID3\tNaproxen\n\nbroken line\n");
    let mono = fixture(
      b"# STITCH,Individual Side Effect,Side Effect Name\n\
        CID1,C0027497,nausea\n\
        CID2,C0027497,nausea\n\
        CID9,C0027497,nausea\n\
        CID2,C0018681,Headache\n",
    );
    let combo = fixture(
      b"STITCH 1,STITCH 2,Polypharmacy Side Effect,Side Effect Name\n\
        CID1,CID3,C0042963,vomiting\n",
    );
    let targets = fixture(b"STITCH,Gene\nCID1,P1\nCID2,P1\nCID1,P1\n");

    let store = SqliteStore::open_in_memory().await.unwrap();
    let sources = ImportSources {
      drugs:   Some(drugs.path().to_owned()),
      mono:    Some(mono.path().to_owned()),
      combo:   Some(combo.path().to_owned()),
      targets: Some(targets.path().to_owned()),
    };

    let summary = run(&store, &sources, 2).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.rows.orphaned, 1);
    assert!(summary.batches > 4);
    assert_eq!(store.counts().await.unwrap(), CatalogCounts {
      drugs:             3,
      side_effects:      3,
      side_effect_facts: 5,
      target_facts:      2,
    });

    assert_eq!(side_effect_names(&store, "CID3").await, ["vomiting"]);
    let aspirin = store.drugs_matching_name("aspirin").await.unwrap();
    assert_eq!(aspirin, [Drug::new("CID1", "Aspirin")]);
  }

  #[tokio::test]
  async fn quoted_fields_follow_csv_rules() {
    let drugs = fixture(b"CID1\tAspirin\nCID2\tIbuprofen\n");
    let mono = fixture(
      b"STITCH,Individual Side Effect,Side Effect Name\n\
        \"CID1\",C1,\"Pain, \"\"severe\"\"\"\n\
        CID2,C2,Pain, back\n",
    );
    let store = SqliteStore::open_in_memory().await.unwrap();
    let sources = ImportSources {
      drugs: Some(drugs.path().to_owned()),
      mono: Some(mono.path().to_owned()),
      ..Default::default()
    };

    let summary = run(&store, &sources, 100).await.unwrap();

    assert_eq!(summary.skipped, 0);
    assert_eq!(side_effect_names(&store, "CID1").await, [r#"Pain, "severe""#]);
    assert_eq!(side_effect_names(&store, "CID2").await, ["Pain, back"]);
  }

  #[tokio::test]
  async fn combination_rows_need_both_drugs() {
    let drugs = fixture(b"CID1\tAspirin\nCID2\tIbuprofen\n");
    let combo = fixture(
      b"STITCH 1,STITCH 2,Polypharmacy Side Effect,Side Effect Name\n\
        CID1,CID2,C0042963,vomiting\n\
        CID1,CID9,C0011991,diarrhoea\n",
    );
    let store = SqliteStore::open_in_memory().await.unwrap();
    let sources = ImportSources {
      drugs: Some(drugs.path().to_owned()),
      combo: Some(combo.path().to_owned()),
      ..Default::default()
    };

    let summary = run(&store, &sources, 100).await.unwrap();

    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.rows.orphaned, 0);
    assert_eq!(side_effect_names(&store, "CID1").await, ["vomiting"]);
    // The dropped row contributes neither a fact nor its side effect.
    let counts = store.counts().await.unwrap();
    assert_eq!((counts.side_effects, counts.side_effect_facts), (1, 2));
  }

  #[tokio::test]
  async fn reimport_is_idempotent() {
    let drugs = fixture(b"CID1\tAspirin\n");
    let targets = fixture(b"STITCH,Gene\nCID1,P1\n");
    let store = SqliteStore::open_in_memory().await.unwrap();
    let sources = ImportSources {
      drugs: Some(drugs.path().to_owned()),
      targets: Some(targets.path().to_owned()),
      ..Default::default()
    };

    run(&store, &sources, 100).await.unwrap();
    let second = run(&store, &sources, 100).await.unwrap();

    assert_eq!(second.rows.inserted, 0);
    assert_eq!(second.rows.unchanged, 2);
  }

  #[tokio::test]
  async fn missing_file_is_an_io_error() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let sources = ImportSources {
      drugs: Some(PathBuf::from("/nonexistent/drugs.tsv")),
      ..Default::default()
    };

    let err = run(&store, &sources, 10).await.unwrap_err();
    assert!(matches!(err, ImportError::Io { .. }), "got {err}");
  }
}
