//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings and audit payloads as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use medimatch_core::audit::{AuditPayload, AuditRecord};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// Fixed-width (microseconds, `Z`), so stored strings sort chronologically.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Audit payload ────────────────────────────────────────────────────────────

pub fn encode_payload(payload: &AuditPayload) -> Result<String> {
  Ok(payload.to_json()?.to_string())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditRecord {
  pub audit_id:    String,
  pub query_type:  String,
  pub input_text:  String,
  pub result_json: String,
  pub recorded_at: String,
}

impl RawAuditRecord {
  pub fn into_record(self) -> Result<AuditRecord> {
    let data: serde_json::Value = serde_json::from_str(&self.result_json)?;
    Ok(AuditRecord {
      audit_id:    decode_uuid(&self.audit_id)?,
      input_text:  self.input_text,
      payload:     AuditPayload::from_parts(&self.query_type, data)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
