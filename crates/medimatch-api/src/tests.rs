//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode},
};
use medimatch_core::{
  catalog::{Drug, DrugSideEffectFact, DrugTargetFact, IngestBatch, SideEffect},
  store::CatalogStore,
};
use medimatch_engine::{
  AuditConfig, AuditLogger, CorrelationBuilder, DelimitedTermExtractor, IndexHandle,
  QueryService,
};
use medimatch_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{AppState, QueryLimits, api_router};

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

async fn app() -> Router {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  store.ingest(two_nsaids()).await.unwrap();

  let index = IndexHandle::new();
  let audit = AuditLogger::spawn(Arc::clone(&store), &AuditConfig::default());
  api_router(AppState {
    service:   QueryService::new(Arc::clone(&store), index.clone(), audit),
    builder:   CorrelationBuilder::new(store, index),
    extractor: Arc::new(DelimitedTermExtractor),
    limits:    QueryLimits::default(),
  })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let request = match body {
    Some(body) => builder
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let response = app.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) { send(app, "GET", uri, None).await }

#[tokio::test]
async fn correlations_after_rebuild() {
  let app = app().await;

  let (status, cold) = get(&app, "/correlations").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(cold["index_version"], 0);
  assert_eq!(cold["cells"], json!([]));

  let (status, summary) = send(&app, "POST", "/index/rebuild", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(summary["version"], 1);
  assert_eq!(summary["cells"], 1);

  let (_, page) = get(&app, "/correlations?min_count=1").await;
  assert_eq!(page["min_count"], 2);
  assert_eq!(page["cells"][0]["protein_id"], "P1");
  assert_eq!(page["cells"][0]["side_effect_name"], "Nausea");
  assert_eq!(page["cells"][0]["drug_count"], 2);
  assert_eq!(page["fingerprint"], summary["fingerprint"]);
}

#[tokio::test]
async fn drill_down_lists_drug_names() {
  let app = app().await;
  send(&app, "POST", "/index/rebuild", None).await;

  let (status, drill) = get(&app, "/correlations/drugs?protein_id=P1&side_effect=nausea").await;
  assert_eq!(status, StatusCode::OK);
  let names: Vec<&str> = drill["drugs"]
    .as_array()
    .unwrap()
    .iter()
    .map(|d| d["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, ["Aspirin", "Ibuprofen"]);

  let (status, by_id) = get(&app, "/correlations/drugs?protein_id=P1&side_effect_id=S1").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(by_id["drugs"], drill["drugs"]);
  assert_eq!(by_id["cell"]["side_effect_id"], "S1");

  let (status, _) = get(&app, "/correlations/drugs?protein_id=P1").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ambiguous_side_effect_name_is_a_bad_request() {
  let app = app().await;
  let (status, _) = send(
    &app,
    "POST",
    "/ingest",
    Some(json!({
      "side_effects": [{ "side_effect_id": "S2", "name": "nausea." }],
      "side_effect_facts": [
        { "drug_id": "D1", "side_effect_id": "S2" },
        { "drug_id": "D2", "side_effect_id": "S2" }
      ]
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  send(&app, "POST", "/index/rebuild", None).await;

  let (status, err) = get(&app, "/correlations/drugs?protein_id=P1&side_effect=Nausea").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(err["error"].as_str().unwrap().contains("S2"));

  let (status, drill) = get(&app, "/correlations/drugs?protein_id=P1&side_effect_id=S2").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(drill["drugs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn drug_lookups() {
  let app = app().await;

  let (status, drugs) = get(&app, "/drugs/search?q=%20%20ASPIRIN%20").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(drugs, json!([{ "drug_id": "D1", "name": "Aspirin" }]));

  let (_, effects) = get(&app, "/drugs/D2/side-effects").await;
  assert_eq!(effects["side_effects"], json!(["Nausea"]));

  let (status, unknown) = get(&app, "/drugs/unknown-id/side-effects").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(unknown["side_effects"], json!([]));

  let (status, err) = get(&app, "/drugs/search").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(err["error"].is_string());
}

#[tokio::test]
async fn symptom_endpoints() {
  let app = app().await;

  let (status, found) = get(&app, "/symptoms?terms=NAUSEA,,dizziness").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(found["terms"], json!(["nausea", "dizziness"]));
  assert_eq!(found["matches"].as_array().unwrap().len(), 2);

  let (status, analyzed) = get(&app, "/symptoms/analyze?text=dizziness%20and%20nausea&limit=1").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(analyzed["matches"].as_array().unwrap().len(), 1);
  assert_eq!(analyzed["matches"][0]["side_effect"]["name"], "Nausea");

  let (status, _) = get(&app, "/symptoms/analyze?text=%20").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_reports_and_rejects_conflicts() {
  let app = app().await;

  let (status, report) = send(
    &app,
    "POST",
    "/ingest",
    Some(json!({
      "drugs": [{ "drug_id": "D3", "name": "Naproxen" }],
      "side_effect_facts": [
        { "drug_id": "D3", "side_effect_id": "S1" },
        { "drug_id": "D9", "side_effect_id": "S1" }
      ]
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report, json!({ "inserted": 2, "unchanged": 0, "orphaned": 1 }));

  let (status, err) = send(
    &app,
    "POST",
    "/ingest",
    Some(json!({ "drugs": [{ "drug_id": "D1", "name": "Paracetamol" }] })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(err["error"].as_str().unwrap().contains("D1"));
}

#[tokio::test]
async fn health_reports_counts_and_index() {
  let app = app().await;
  send(&app, "POST", "/index/rebuild", None).await;
  get(&app, "/drugs/search?q=ibu").await;

  let (status, health) = get(&app, "/health").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(health["status"], "ok");
  assert_eq!(health["catalog"]["drugs"], 2);
  assert_eq!(health["catalog"]["target_facts"], 2);
  assert_eq!(health["index"]["version"], 1);
  assert_eq!(health["building"], false);
  assert!(health["audit"]["enqueued"].as_u64().unwrap() >= 1);
}
