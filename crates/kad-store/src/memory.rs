//! In-memory event store (process lifetime only).

use crate::matches_query;
use kad_types::{
    AuditListOptions, AuditPage, AuditRecord, EventStore, NewAuditRecord, ResourceQuery,
    StoreError,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of EventStore.
/// Records are kept in insertion order; ids start at 1.
pub struct InMemoryEventStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, records: &[NewAuditRecord]) -> Result<usize, StoreError> {
        let mut guard = self.records.write().await;
        let mut next_id = guard.last().map(|r| r.id).unwrap_or(0) + 1;
        for record in records {
            guard.push(AuditRecord::new(next_id, record.clone()));
            next_id += 1;
        }
        Ok(records.len())
    }

    async fn find_for_resource(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let guard = self.records.read().await;
        let mut out: Vec<AuditRecord> = guard
            .iter()
            .filter(|r| matches_query(&r.record, query))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.record
                .request_timestamp
                .cmp(&b.record.request_timestamp)
                .then(a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<AuditPage, StoreError> {
        let guard = self.records.read().await;
        let matching: Vec<&AuditRecord> =
            guard.iter().filter(|r| opts.matches(&r.record)).collect();
        let total = matching.len();
        let (offset, limit) = opts.offset_limit();
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(AuditPage::new(total, opts, rows))
    }
}
