//! Event store abstraction shared by the store backends and the lifecycle service.

use crate::{AuditListOptions, AuditPage, AuditRecord, NewAuditRecord, ResourceQuery};
use async_trait::async_trait;

/// Append-only audit record store.
///
/// Contract: `find_for_resource` returns every record whose object reference matches the
/// query exactly, ordered ascending by request timestamp, ties broken by ascending id.
/// An unknown resource yields `Ok(vec![])`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append records in order; returns how many were stored.
    async fn append_batch(&self, records: &[NewAuditRecord]) -> Result<usize, StoreError>;

    /// All records for one resource, oldest first.
    async fn find_for_resource(&self, query: &ResourceQuery)
        -> Result<Vec<AuditRecord>, StoreError>;

    /// Filtered page of records, ascending by id.
    async fn list(&self, opts: &AuditListOptions) -> Result<AuditPage, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event store error: {0}")]
    Other(String),
    #[error("event store request timed out")]
    Timeout,
}
