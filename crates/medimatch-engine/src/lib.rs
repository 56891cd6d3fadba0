//! Process-scoped runtime of MediMatch.
//!
//! - [`IndexHandle`] holds the active correlation index; readers get a
//!   complete immutable snapshot, the builder swaps in a new one.
//! - [`CorrelationBuilder`] recomputes the index from a fact snapshot.
//! - [`DrillDownResolver`] recovers the drugs behind one cell.
//! - [`AuditLogger`] appends query records in the background.
//! - [`QueryService`] ties them together and audits every query.
//!
//! Nothing here is global: the server constructs one of each at startup and
//! passes them around explicitly.

pub mod audit;
pub mod builder;
pub mod error;
pub mod index;
pub mod resolver;
pub mod service;
pub mod terms;

pub use audit::{AuditConfig, AuditLogger, AuditStats};
pub use builder::CorrelationBuilder;
pub use error::{Error, Result};
pub use index::{CorrelationIndex, IndexHandle};
pub use resolver::{DrillDown, DrillDownResolver, SideEffectRef};
pub use service::{CorrelationPage, QueryService, SymptomSearch};
pub use terms::DelimitedTermExtractor;
