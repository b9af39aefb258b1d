//! Lifecycle engine: turns stored audit records into a per-resource timeline with
//! field-level diffs between consecutive known states.
//!
//! - [`diff`]: flattened structural diff of two JSON/YAML documents.
//! - [`extract`]: resource state and user from a stored audit payload.
//! - [`service`]: timeline reconstruction over an [`kad_types::EventStore`].

pub mod diff;
pub mod extract;
pub mod service;

pub use diff::{
    compute_diff, compute_diff_from_str, parse_document, DiffError, Document, DocumentSide,
};
pub use extract::{extract_state, extract_user, parse_payload, ExtractError};
pub use service::{reconstruct, LifecycleError, LifecycleService};
