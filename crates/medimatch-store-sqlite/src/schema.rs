//! SQL schema for the MediMatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Catalog entities. Names never change once ingested.
-- `name_key` is the normalized name used for tolerant matching.
CREATE TABLE IF NOT EXISTS drugs (
    drug_id   TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    name_key  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS side_effects (
    side_effect_id TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    name_key       TEXT NOT NULL
);

-- Facts. Unique on the composite key; re-ingestion is INSERT OR IGNORE.
CREATE TABLE IF NOT EXISTS drug_side_effects (
    drug_id        TEXT    NOT NULL REFERENCES drugs(drug_id),
    side_effect_id TEXT    NOT NULL REFERENCES side_effects(side_effect_id),
    is_combination INTEGER NOT NULL DEFAULT 0,  -- metadata only
    PRIMARY KEY (drug_id, side_effect_id)
);

CREATE TABLE IF NOT EXISTS drug_targets (
    drug_id    TEXT NOT NULL REFERENCES drugs(drug_id),
    protein_id TEXT NOT NULL,
    PRIMARY KEY (drug_id, protein_id)
);

-- Audit log is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    audit_id    TEXT PRIMARY KEY,
    query_type  TEXT NOT NULL,   -- discriminant of AuditPayload variant
    input_text  TEXT NOT NULL,
    result_json TEXT NOT NULL,   -- JSON payload (inner data only)
    recorded_at TEXT NOT NULL    -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS drugs_name_key_idx        ON drugs(name_key);
CREATE INDEX IF NOT EXISTS side_effects_name_key_idx ON side_effects(name_key);
CREATE INDEX IF NOT EXISTS dse_side_effect_idx       ON drug_side_effects(side_effect_id);
CREATE INDEX IF NOT EXISTS targets_protein_idx       ON drug_targets(protein_id);
CREATE INDEX IF NOT EXISTS audit_recorded_idx        ON audit_log(recorded_at);

PRAGMA user_version = 1;
";
