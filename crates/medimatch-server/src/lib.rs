//! Server assembly for the `medimatch` binary: configuration, the bulk
//! importer and the top-level HTTP router.

pub mod config;
pub mod import;

use axum::Router;
use medimatch_api::{AppState, api_router};
use medimatch_core::store::{CatalogStore, FactSource, TermExtractor};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;

/// The JSON API mounted under `/api`, with request tracing.
pub fn router<S, E>(state: AppState<S, E>) -> Router
where
  S: CatalogStore + FactSource + 'static,
  E: TermExtractor + 'static,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}
