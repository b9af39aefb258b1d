//! Core types for the Kubernetes audit lifecycle service.
//!
//! Field names serialize in camelCase to match the dashboard's GraphQL schema.

mod event;
mod identifier;
mod record;
mod traits;

pub use event::*;
pub use identifier::*;
pub use record::*;
pub use traits::*;
