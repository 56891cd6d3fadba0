//! Core types and trait definitions for MediMatch.
//!
//! This crate is deliberately free of HTTP, database and runtime dependencies.
//! It holds the catalog model, the text normalizer, the correlation
//! aggregation kernel and the audit payload types. All other crates depend on
//! it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod catalog;
pub mod correlation;
pub mod error;
pub mod normalize;
pub mod store;

pub use error::{Error, Result};
