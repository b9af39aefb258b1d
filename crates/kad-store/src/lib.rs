//! Event store backends and audit webhook normalization.

mod ingest;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use ingest::{decode_event_list, IngestError};
pub use kad_types::{
    AuditListOptions, AuditPage, AuditRecord, EventStore, NewAuditRecord, ResourceQuery,
    StoreError,
};
pub use memory::InMemoryEventStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

/// Whether a stored record's object reference is exactly the queried resource.
pub(crate) fn matches_query(record: &NewAuditRecord, query: &ResourceQuery) -> bool {
    record.api_group == query.api_group
        && record.api_version == query.api_version
        && record.resource == query.resource
        && record.namespace == query.namespace
        && record.name == query.name
}
