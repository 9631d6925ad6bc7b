//! Data access subsystem.
//!
//! # Data Flow
//! ```text
//! Business handler
//!     → access.rs (DataAccess::execute with per-call QueryOptions)
//!     → external data service operation
//!     → envelope.rs (normalize error, classify PolicyDenial / GenericFailure)
//!     → QueryOutcome (fallback on denial, raw error on failure)
//! ```
//!
//! # Design Decisions
//! - Policy denials never leave this module as errors
//! - Fallback shape is chosen per call site, not guessed
//! - No retries; retry policy belongs to the caller

pub mod access;
pub mod envelope;

pub use access::{DataAccess, FallbackKind, Page, Pagination, QueryOptions, QueryOutcome};
pub use envelope::{ErrorClassification, ErrorClassifier, ErrorEnvelope};
