//! Audit records — one per query served.
//!
//! The payload is a closed set of known result shapes plus a free-form
//! escape hatch, so new query types can be audited before they get a
//! dedicated variant. The variant name is the `query_type` stored next to
//! the JSON payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Payload sub-types ───────────────────────────────────────────────────────

/// Result of a direct drug → side effects lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectsAudit {
  pub drug_id:      String,
  pub side_effects: Vec<String>,
}

/// Result of a drug name search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugSearchAudit {
  /// The normalization key actually matched.
  pub key:      String,
  pub drug_ids: Vec<String>,
}

/// Result of a correlation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationsAudit {
  pub min_count:     u32,
  pub index_version: u64,
  pub returned:      usize,
}

/// Result of a drill-down into one correlation cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillDownAudit {
  pub protein_id:     String,
  /// The side-effect id or name as requested.
  pub side_effect:    String,
  /// The side effect of the resolved cell, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub side_effect_id: Option<String>,
  pub index_version:  u64,
  pub drugs:          Vec<String>,
}

/// One (drug, side effect) pair found by a reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomHit {
  pub drug:        String,
  pub side_effect: String,
}

/// Result of a reverse (symptom → drug) lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomSearchAudit {
  pub terms:   Vec<String>,
  pub matches: Vec<SymptomHit>,
}

// ─── AuditPayload ────────────────────────────────────────────────────────────

/// The structured result of an audited query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AuditPayload {
  SideEffects(SideEffectsAudit),
  DrugSearch(DrugSearchAudit),
  Correlations(CorrelationsAudit),
  DrillDown(DrillDownAudit),
  SymptomSearch(SymptomSearchAudit),

  /// Escape hatch for query types without a dedicated shape.
  Custom {
    attributes: serde_json::Map<String, serde_json::Value>,
  },
}

/// Every `query_type` a payload can carry.
const QUERY_TYPES: &[&str] = &[
  "side_effects",
  "drug_search",
  "correlations",
  "drill_down",
  "symptom_search",
  "custom",
];

impl AuditPayload {
  /// The discriminant stored in the `query_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn query_type(&self) -> &'static str {
    match self {
      Self::SideEffects(_) => "side_effects",
      Self::DrugSearch(_) => "drug_search",
      Self::Correlations(_) => "correlations",
      Self::DrillDown(_) => "drill_down",
      Self::SymptomSearch(_) => "symptom_search",
      Self::Custom { .. } => "custom",
    }
  }

  /// Serialise the inner payload (without the type tag) for the
  /// `result_json` column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild a payload from the stored query type and JSON payload.
  ///
  /// An unrecognised tag is [`Error::UnknownQueryType`]; malformed data under
  /// a known tag is [`Error::Serialization`].
  pub fn from_parts(query_type: &str, data: serde_json::Value) -> Result<Self> {
    if !QUERY_TYPES.contains(&query_type) {
      return Err(Error::UnknownQueryType(query_type.to_owned()));
    }
    let wrapped = serde_json::json!({ "type": query_type, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── AuditRecord ─────────────────────────────────────────────────────────────

/// One append-only audit log entry. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
  pub audit_id:    Uuid,
  /// The raw caller input, before normalization.
  pub input_text:  String,
  pub payload:     AuditPayload,
  pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
  /// Stamp a new record with a fresh id and the current time.
  pub fn new(input_text: impl Into<String>, payload: AuditPayload) -> Self {
    Self {
      audit_id: Uuid::new_v4(),
      input_text: input_text.into(),
      payload,
      recorded_at: Utc::now(),
    }
  }

  pub fn query_type(&self) -> &'static str { self.payload.query_type() }
}
