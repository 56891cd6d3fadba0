//! [`SqliteStore`] — the SQLite implementation of the MediMatch store traits.

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use medimatch_core::{
  audit::AuditRecord,
  catalog::{
    CatalogCounts, Drug, DrugSideEffectFact, DrugTargetFact, EntityKind,
    FactSnapshot, IngestBatch, IngestReport, SideEffect, SymptomMatch,
    UpsertOutcome,
  },
  normalize::normalize,
  store::{AuditSink, CatalogStore, FactSource},
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  encode::{encode_dt, encode_payload, encode_uuid, RawAuditRecord},
  schema::SCHEMA,
  Result,
};

/// Outcome of a statement that may hit a catalog conflict. The outer result
/// is a database failure, the inner one a rejected rename.
type Checked<T> = rusqlite::Result<std::result::Result<T, medimatch_core::Error>>;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A MediMatch store backed by a single SQLite file.
///
/// File stores keep two connections: `conn` serves writes and lookups,
/// `snapshot` serves [`FactSource::fact_snapshot`]. Under WAL a read
/// transaction on `snapshot` sees one point in time while writers carry on,
/// so a correlation build never queues ingestion behind its table scans.
///
/// Cloning is cheap — the inner connections are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:                tokio_rusqlite::Connection,
  pub(crate) snapshot: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    init_schema(&conn).await?;
    // Opened after the schema, so it finds the database already in WAL mode.
    let snapshot = tokio_rusqlite::Connection::open(path).await?;
    Ok(Self { conn, snapshot })
  }

  /// Open an in-memory store, for tests.
  ///
  /// An in-memory database is private to its connection, so snapshots share
  /// the one connection here.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    init_schema(&conn).await?;
    Ok(Self { snapshot: conn.clone(), conn })
  }

  /// The most recent audit records, newest first.
  ///
  /// For operational tooling only; nothing on the serving path reads the
  /// audit log back.
  pub async fn recent_audit_records(&self, limit: usize) -> Result<Vec<AuditRecord>> {
    let limit_val = limit as i64;

    let raws: Vec<RawAuditRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, query_type, input_text, result_json, recorded_at
           FROM audit_log
           ORDER BY recorded_at DESC, rowid DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| {
            Ok(RawAuditRecord {
              audit_id:    row.get(0)?,
              query_type:  row.get(1)?,
              input_text:  row.get(2)?,
              result_json: row.get(3)?,
              recorded_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditRecord::into_record).collect()
  }
}

async fn init_schema(conn: &tokio_rusqlite::Connection) -> Result<()> {
  conn
    .call(|conn| {
      conn.execute_batch(SCHEMA)?;
      Ok(())
    })
    .await?;
  Ok(())
}

// ─── Statement helpers ───────────────────────────────────────────────────────
//
// Shared by the single-row trait methods and the batched `ingest`, which runs
// them inside one transaction.

fn upsert_entity(
  conn: &Connection,
  kind: EntityKind,
  id:   &str,
  name: &str,
) -> Checked<UpsertOutcome> {
  let (insert, select) = match kind {
    EntityKind::Drug => (
      "INSERT OR IGNORE INTO drugs (drug_id, name, name_key) VALUES (?1, ?2, ?3)",
      "SELECT name FROM drugs WHERE drug_id = ?1",
    ),
    EntityKind::SideEffect => (
      "INSERT OR IGNORE INTO side_effects (side_effect_id, name, name_key)
       VALUES (?1, ?2, ?3)",
      "SELECT name FROM side_effects WHERE side_effect_id = ?1",
    ),
  };

  let changed = conn
    .prepare_cached(insert)?
    .execute(rusqlite::params![id, name, normalize(name)])?;
  if changed > 0 {
    return Ok(Ok(UpsertOutcome::Inserted));
  }

  let existing: String = conn
    .prepare_cached(select)?
    .query_row(rusqlite::params![id], |r| r.get(0))?;
  if existing == name {
    Ok(Ok(UpsertOutcome::Unchanged))
  } else {
    Ok(Err(medimatch_core::Error::Conflict {
      kind,
      id: id.to_owned(),
      existing,
      attempted: name.to_owned(),
    }))
  }
}

fn upsert_side_effect_fact_row(
  conn: &Connection,
  fact: &DrugSideEffectFact,
) -> rusqlite::Result<UpsertOutcome> {
  let changed = conn
    .prepare_cached(
      "INSERT OR IGNORE INTO drug_side_effects (drug_id, side_effect_id, is_combination)
       SELECT ?1, ?2, ?3
       WHERE EXISTS (SELECT 1 FROM drugs        WHERE drug_id        = ?1)
         AND EXISTS (SELECT 1 FROM side_effects WHERE side_effect_id = ?2)",
    )?
    .execute(rusqlite::params![
      fact.drug_id,
      fact.side_effect_id,
      fact.is_combination
    ])?;
  if changed > 0 {
    return Ok(UpsertOutcome::Inserted);
  }

  let present = conn
    .prepare_cached(
      "SELECT 1 FROM drug_side_effects WHERE drug_id = ?1 AND side_effect_id = ?2",
    )?
    .query_row(rusqlite::params![fact.drug_id, fact.side_effect_id], |_| Ok(()))
    .optional()?
    .is_some();
  Ok(if present { UpsertOutcome::Unchanged } else { UpsertOutcome::Orphaned })
}

fn upsert_target_fact_row(
  conn: &Connection,
  fact: &DrugTargetFact,
) -> rusqlite::Result<UpsertOutcome> {
  let changed = conn
    .prepare_cached(
      "INSERT OR IGNORE INTO drug_targets (drug_id, protein_id)
       SELECT ?1, ?2
       WHERE EXISTS (SELECT 1 FROM drugs WHERE drug_id = ?1)",
    )?
    .execute(rusqlite::params![fact.drug_id, fact.protein_id])?;
  if changed > 0 {
    return Ok(UpsertOutcome::Inserted);
  }

  let present = conn
    .prepare_cached("SELECT 1 FROM drug_targets WHERE drug_id = ?1 AND protein_id = ?2")?
    .query_row(rusqlite::params![fact.drug_id, fact.protein_id], |_| Ok(()))
    .optional()?
    .is_some();
  Ok(if present { UpsertOutcome::Unchanged } else { UpsertOutcome::Orphaned })
}

fn apply_batch(conn: &Connection, batch: &IngestBatch) -> Checked<IngestReport> {
  let mut report = IngestReport::default();

  for drug in &batch.drugs {
    match upsert_entity(conn, EntityKind::Drug, &drug.drug_id, &drug.name)? {
      Ok(outcome) => report.count(outcome),
      Err(conflict) => return Ok(Err(conflict)),
    }
  }
  for se in &batch.side_effects {
    match upsert_entity(conn, EntityKind::SideEffect, &se.side_effect_id, &se.name)? {
      Ok(outcome) => report.count(outcome),
      Err(conflict) => return Ok(Err(conflict)),
    }
  }
  for fact in &batch.side_effect_facts {
    report.count(upsert_side_effect_fact_row(conn, fact)?);
  }
  for fact in &batch.target_facts {
    report.count(upsert_target_fact_row(conn, fact)?);
  }

  Ok(Ok(report))
}

fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
  let n: i64 =
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
  Ok(n as u64)
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert_drug(&self, drug: Drug) -> Result<UpsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        Ok(upsert_entity(conn, EntityKind::Drug, &drug.drug_id, &drug.name)?)
      })
      .await?;
    Ok(outcome?)
  }

  async fn upsert_side_effect(&self, side_effect: SideEffect) -> Result<UpsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        Ok(upsert_entity(
          conn,
          EntityKind::SideEffect,
          &side_effect.side_effect_id,
          &side_effect.name,
        )?)
      })
      .await?;
    Ok(outcome?)
  }

  async fn upsert_side_effect_fact(&self, fact: DrugSideEffectFact) -> Result<UpsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| Ok(upsert_side_effect_fact_row(conn, &fact)?))
      .await?;
    Ok(outcome)
  }

  async fn upsert_target_fact(&self, fact: DrugTargetFact) -> Result<UpsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| Ok(upsert_target_fact_row(conn, &fact)?))
      .await?;
    Ok(outcome)
  }

  async fn ingest(&self, batch: IngestBatch) -> Result<IngestReport> {
    let report = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match apply_batch(&tx, &batch)? {
          Ok(report) => {
            tx.commit()?;
            Ok(Ok(report))
          }
          // Dropping the transaction rolls the whole batch back.
          Err(conflict) => Ok(Err(conflict)),
        }
      })
      .await?;
    Ok(report?)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn side_effects_for_drug(&self, drug_id: &str) -> Result<Vec<SideEffect>> {
    let drug_id = drug_id.to_owned();

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT se.side_effect_id, se.name
           FROM drug_side_effects dse
           JOIN side_effects se ON se.side_effect_id = dse.side_effect_id
           WHERE dse.drug_id = ?1
           ORDER BY se.name_key, se.side_effect_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![drug_id], |row| {
            Ok(SideEffect {
              side_effect_id: row.get(0)?,
              name:           row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn drugs_matching_name(&self, key: &str) -> Result<Vec<Drug>> {
    if key.is_empty() {
      return Ok(Vec::new());
    }
    let key = key.to_owned();

    let rows = self
      .conn
      .call(move |conn| {
        // instr() instead of LIKE: no wildcard escaping needed for user text.
        let mut stmt = conn.prepare_cached(
          "SELECT drug_id, name FROM drugs
           WHERE instr(name_key, ?1) > 0
           ORDER BY name_key, drug_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![key], |row| {
            Ok(Drug { drug_id: row.get(0)?, name: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn drugs_with_side_effect_matching(
    &self,
    key:   &str,
    limit: usize,
  ) -> Result<Vec<SymptomMatch>> {
    if key.is_empty() || limit == 0 {
      return Ok(Vec::new());
    }
    let key = key.to_owned();
    let limit_val = limit as i64;

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT d.drug_id, d.name, se.side_effect_id, se.name
           FROM side_effects se
           JOIN drug_side_effects dse ON dse.side_effect_id = se.side_effect_id
           JOIN drugs d               ON d.drug_id          = dse.drug_id
           WHERE instr(se.name_key, ?1) > 0
           ORDER BY se.name_key, se.side_effect_id, d.name_key, d.drug_id
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![key, limit_val], |row| {
            Ok(SymptomMatch {
              term:        key.clone(),
              drug:        Drug { drug_id: row.get(0)?, name: row.get(1)? },
              side_effect: SideEffect {
                side_effect_id: row.get(2)?,
                name:           row.get(3)?,
              },
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn drugs_for_correlation(
    &self,
    protein_id:     &str,
    side_effect_id: &str,
  ) -> Result<Vec<Drug>> {
    let protein_id = protein_id.to_owned();
    let side_effect_id = side_effect_id.to_owned();

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT d.drug_id, d.name
           FROM drug_targets dt
           JOIN drug_side_effects dse ON dse.drug_id = dt.drug_id
           JOIN drugs d               ON d.drug_id   = dt.drug_id
           WHERE dt.protein_id = ?1
             AND dse.side_effect_id = ?2
           ORDER BY d.name_key, d.drug_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![protein_id, side_effect_id], |row| {
            Ok(Drug { drug_id: row.get(0)?, name: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn drug_ids(&self) -> Result<HashSet<String>> {
    let ids = self
      .conn
      .call(|conn| {
        let ids = conn
          .prepare_cached("SELECT drug_id FROM drugs")?
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn counts(&self) -> Result<CatalogCounts> {
    let counts = self
      .conn
      .call(|conn| {
        Ok(CatalogCounts {
          drugs:             count_rows(conn, "drugs")?,
          side_effects:      count_rows(conn, "side_effects")?,
          side_effect_facts: count_rows(conn, "drug_side_effects")?,
          target_facts:      count_rows(conn, "drug_targets")?,
        })
      })
      .await?;
    Ok(counts)
  }
}

// ─── FactSource impl ─────────────────────────────────────────────────────────

impl FactSource for SqliteStore {
  type Error = crate::Error;

  async fn fact_snapshot(&self) -> Result<FactSnapshot> {
    let snapshot = self
      .snapshot
      .call(|conn| {
        // One read transaction, so all three tables come from the same
        // point in time.
        let tx = conn.transaction()?;

        let side_effect_facts = tx
          .prepare("SELECT drug_id, side_effect_id, is_combination FROM drug_side_effects")?
          .query_map([], |row| {
            Ok(DrugSideEffectFact {
              drug_id:        row.get(0)?,
              side_effect_id: row.get(1)?,
              is_combination: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let target_facts = tx
          .prepare("SELECT drug_id, protein_id FROM drug_targets")?
          .query_map([], |row| {
            Ok(DrugTargetFact { drug_id: row.get(0)?, protein_id: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let side_effect_names: HashMap<String, String> = tx
          .prepare("SELECT side_effect_id, name FROM side_effects")?
          .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
          .collect::<rusqlite::Result<_>>()?;

        tx.commit()?;
        Ok(FactSnapshot { side_effect_facts, target_facts, side_effect_names })
      })
      .await?;
    Ok(snapshot)
  }
}

// ─── AuditSink impl ──────────────────────────────────────────────────────────

impl AuditSink for SqliteStore {
  type Error = crate::Error;

  async fn append(&self, record: AuditRecord) -> Result<()> {
    let id_str      = encode_uuid(record.audit_id);
    let query_type  = record.query_type().to_owned();
    let result_json = encode_payload(&record.payload)?;
    let at_str      = encode_dt(record.recorded_at);
    let input_text  = record.input_text;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (audit_id, query_type, input_text, result_json, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, query_type, input_text, result_json, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
