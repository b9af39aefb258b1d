//! Lifecycle reconstruction: audit records for one resource -> newest-first timeline.

use crate::diff::{compute_diff, Document};
use crate::extract::{extract_state, extract_user, parse_payload, ExtractError};
use kad_types::{
    AuditRecord, EventStore, EventType, IdentifierError, LifecycleEvent, ResourceIdentifier,
    StoreError,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Reconstructs resource timelines from an event store.
pub struct LifecycleService {
    store: Arc<dyn EventStore>,
    fetch_timeout: Option<Duration>,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            fetch_timeout: None,
        }
    }

    /// Bound the store fetch. On expiry the call fails with [`StoreError::Timeout`].
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Timeline for a resource given as separate parts (`namespace` `None` for
    /// cluster-scoped). Parts are validated before the store is touched.
    pub async fn resource_lifecycle_parts(
        &self,
        api_group: &str,
        version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Vec<LifecycleEvent>, LifecycleError> {
        let id = ResourceIdentifier::new(api_group, version, kind, namespace, name)?;
        self.resource_lifecycle(&id).await
    }

    /// Newest-first timeline for `id`. A resource with no records yields an empty timeline.
    pub async fn resource_lifecycle(
        &self,
        id: &ResourceIdentifier,
    ) -> Result<Vec<LifecycleEvent>, LifecycleError> {
        let query = id.to_query();
        let fetch = self.store.find_for_resource(&query);
        let records = match self.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            },
            None => fetch.await,
        }
        .map_err(|source| LifecycleError::Store {
            operation: "query audit events",
            source,
        })?;

        let events = reconstruct(&records);
        tracing::debug!(
            resource = %id,
            records = records.len(),
            events = events.len(),
            "reconstructed lifecycle"
        );
        Ok(events)
    }
}

/// Turn records ordered oldest-first into a newest-first timeline.
///
/// Records whose payload or object cannot be decoded are dropped. Only Create/Update states
/// move the last-known-state cursor; Delete clears it; Get leaves it untouched. Only Update
/// events that carry their own state and follow a known state get `diff`/`previous_state`.
pub fn reconstruct(records: &[AuditRecord]) -> Vec<LifecycleEvent> {
    let mut events = Vec::with_capacity(records.len());
    let mut last_state: Option<Document> = None;

    for record in records {
        let event_type = EventType::from_verb(record.verb());
        let (state, user) = match decode_record(record, event_type) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(record_id = record.id, error = %e, "skipping audit record");
                continue;
            }
        };

        let mut event = LifecycleEvent {
            id: record.id,
            event_type,
            timestamp: record.record.request_timestamp,
            user,
            resource_state: Value::Object(state.clone().unwrap_or_default()),
            diff: None,
            previous_state: None,
        };

        match event_type {
            EventType::Create => {
                if state.is_some() {
                    last_state = state;
                }
            }
            EventType::Update => {
                if let Some(current) = state {
                    if let Some(previous) = last_state.take() {
                        event.diff = Some(compute_diff(Some(&previous), Some(&current)));
                        event.previous_state = Some(Value::Object(previous));
                    }
                    last_state = Some(current);
                }
            }
            EventType::Delete => last_state = None,
            EventType::Get => {}
        }

        events.push(event);
    }

    events.reverse();
    events
}

fn decode_record(
    record: &AuditRecord,
    event_type: EventType,
) -> Result<(Option<Document>, String), ExtractError> {
    let payload = parse_payload(record.raw())?;
    let state = extract_state(event_type, &payload)?;
    let user = if record.record.user.is_empty() {
        extract_user(&payload).unwrap_or_default().to_string()
    } else {
        record.record.user.clone()
    };
    Ok((state, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use kad_store::InMemoryEventStore;
    use kad_types::{AuditListOptions, AuditPage, NewAuditRecord, ResourceQuery};
    use serde_json::json;

    fn deployment(replicas: u32) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "webapp",
                "namespace": "default",
                "resourceVersion": format!("{replicas}00")
            },
            "spec": {"replicas": replicas}
        })
    }

    fn record(verb: &str, minute: i64, response: Option<Value>) -> NewAuditRecord {
        let ts =
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + ChronoDuration::minutes(minute);
        let mut raw = json!({
            "level": "RequestResponse",
            "verb": verb,
            "user": {"username": "admin"},
            "objectRef": {"apiGroup": "apps", "apiVersion": "v1", "resource": "deployments",
                          "namespace": "default", "name": "webapp"},
        });
        if let Some(obj) = response {
            raw["responseObject"] = obj;
        }
        NewAuditRecord {
            audit_id: format!("{verb}-{minute}"),
            level: "RequestResponse".to_string(),
            stage: "ResponseComplete".to_string(),
            verb: verb.to_string(),
            user: "admin".to_string(),
            user_agent: "kubectl".to_string(),
            request_timestamp: ts,
            stage_timestamp: ts,
            api_group: "apps".to_string(),
            api_version: "apps/v1".to_string(),
            resource: "deployments".to_string(),
            subresource: String::new(),
            namespace: "default".to_string(),
            name: "webapp".to_string(),
            raw: raw.to_string(),
        }
    }

    fn stored(records: Vec<NewAuditRecord>) -> Vec<AuditRecord> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, r)| AuditRecord::new(i as i64 + 1, r))
            .collect()
    }

    fn types(events: &[LifecycleEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type.as_str()).collect()
    }

    #[test]
    fn create_then_update_newest_first() {
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            record("update", 5, Some(deployment(3))),
        ]));
        assert_eq!(types(&events), ["UPDATE", "CREATE"]);

        let update = &events[0];
        let diff = update.diff.as_ref().unwrap();
        assert_eq!(diff.modified["spec.replicas"].old_value, json!(1));
        assert_eq!(diff.modified["spec.replicas"].new_value, json!(3));
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(update.previous_state.as_ref(), Some(&deployment(1)));

        let create = &events[1];
        assert!(create.diff.is_none());
        assert!(create.previous_state.is_none());
    }

    #[test]
    fn gets_do_not_move_the_cursor() {
        let mut get_state = deployment(2);
        get_state["metadata"]["labels"] = json!({"seen": "by-get"});
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            record("get", 1, Some(get_state.clone())),
            record("get", 2, Some(get_state)),
            record("update", 3, Some(deployment(3))),
        ]));
        assert_eq!(types(&events), ["UPDATE", "GET", "GET", "CREATE"]);
        assert_eq!(events[0].previous_state.as_ref(), Some(&deployment(1)));
        assert!(events[1].diff.is_none());
        assert!(events[2].diff.is_none());
        let labels = &events[1].resource_state["metadata"]["labels"];
        assert_eq!(labels["seen"], "by-get");
    }

    #[test]
    fn update_without_prior_state_has_no_diff() {
        let events = reconstruct(&stored(vec![record("patch", 0, Some(deployment(2)))]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Update);
        assert!(events[0].diff.is_none());
        assert!(events[0].previous_state.is_none());
    }

    #[test]
    fn create_and_delete_never_carry_diffs() {
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            record("create", 1, Some(deployment(2))),
            record("delete", 2, Some(json!({"kind": "Status"}))),
            record("update", 3, Some(deployment(4))),
        ]));
        assert_eq!(types(&events), ["UPDATE", "DELETE", "CREATE", "CREATE"]);
        assert_eq!(events[1].resource_state, json!({}));
        // delete resets the cursor, so the last update has nothing to diff against
        assert!(events.iter().all(|e| e.diff.is_none()));
    }

    #[test]
    fn malformed_records_are_dropped() {
        let mut bad = record("update", 1, None);
        bad.raw = "invalid json".to_string();
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            bad,
            record("update", 2, Some(deployment(5))),
        ]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 3);
        assert_eq!(events[0].previous_state.as_ref(), Some(&deployment(1)));
    }

    #[test]
    fn equal_timestamps_reverse_insertion_order() {
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            record("update", 0, Some(deployment(2))),
            record("update", 0, Some(deployment(3))),
        ]));
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn unknown_verbs_are_updates() {
        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            record("watch", 1, None),
        ]));
        assert_eq!(events[0].event_type, EventType::Update);
        assert!(events[0].diff.is_none());
        assert_eq!(events[0].resource_state, json!({}));
    }

    #[test]
    fn json_patch_update_keeps_its_place() {
        let mut patch = record("patch", 1, None);
        let mut raw: Value = serde_json::from_str(&patch.raw).unwrap();
        raw["requestObject"] = json!([{"op": "replace", "path": "/spec/replicas", "value": 3}]);
        patch.raw = raw.to_string();

        let events = reconstruct(&stored(vec![patch.clone()]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Update);
        assert_eq!(events[0].resource_state, json!({}));
        assert!(events[0].diff.is_none());

        let events = reconstruct(&stored(vec![
            record("create", 0, Some(deployment(1))),
            patch,
            record("update", 2, Some(deployment(3))),
        ]));
        assert_eq!(types(&events), ["UPDATE", "UPDATE", "CREATE"]);
        assert_eq!(events[0].previous_state.as_ref(), Some(&deployment(1)));
    }

    #[test]
    fn user_falls_back_to_payload() {
        let mut r = record("create", 0, Some(deployment(1)));
        r.user = String::new();
        let events = reconstruct(&stored(vec![r]));
        assert_eq!(events[0].user, "admin");
    }

    #[tokio::test]
    async fn service_reads_from_store() {
        let store = Arc::new(InMemoryEventStore::new());
        store
            .append_batch(&[
                record("create", 0, Some(deployment(1))),
                record("update", 1, Some(deployment(3))),
            ])
            .await
            .unwrap();
        let service = LifecycleService::new(store);

        let events = service
            .resource_lifecycle_parts("apps", "v1", "Deployment", Some("default"), "webapp")
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp > events[1].timestamp);

        let empty = service
            .resource_lifecycle_parts("apps", "v1", "Deployment", Some("default"), "missing")
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    /// Store that must never be reached.
    struct UnreachableStore;

    #[async_trait::async_trait]
    impl EventStore for UnreachableStore {
        async fn append_batch(&self, _: &[NewAuditRecord]) -> Result<usize, StoreError> {
            panic!("store touched")
        }
        async fn find_for_resource(
            &self,
            _: &ResourceQuery,
        ) -> Result<Vec<AuditRecord>, StoreError> {
            panic!("store touched")
        }
        async fn list(&self, _: &AuditListOptions) -> Result<AuditPage, StoreError> {
            panic!("store touched")
        }
    }

    #[tokio::test]
    async fn validation_happens_before_store_access() {
        let service = LifecycleService::new(Arc::new(UnreachableStore));
        for (version, kind, name, expected) in [
            ("v1", "Deployment", "", "name cannot be empty"),
            ("v1", "", "test", "kind cannot be empty"),
            ("", "Deployment", "test", "version cannot be empty"),
        ] {
            let err = service
                .resource_lifecycle_parts("apps", version, kind, Some("default"), name)
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::Identifier(_)));
            assert!(err.to_string().contains(expected), "{err}");
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl EventStore for FailingStore {
        async fn append_batch(&self, _: &[NewAuditRecord]) -> Result<usize, StoreError> {
            Ok(0)
        }
        async fn find_for_resource(
            &self,
            _: &ResourceQuery,
        ) -> Result<Vec<AuditRecord>, StoreError> {
            Err(StoreError::Other("disk on fire".to_string()))
        }
        async fn list(&self, opts: &AuditListOptions) -> Result<AuditPage, StoreError> {
            Ok(AuditPage::new(0, opts, Vec::new()))
        }
    }

    #[tokio::test]
    async fn store_errors_carry_the_operation() {
        let service = LifecycleService::new(Arc::new(FailingStore));
        let err = service
            .resource_lifecycle_parts("", "v1", "ConfigMap", None, "cfg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Store {
                operation: "query audit events",
                ..
            }
        ));
        assert!(err.to_string().contains("disk on fire"));
    }

    struct SlowStore;

    #[async_trait::async_trait]
    impl EventStore for SlowStore {
        async fn append_batch(&self, _: &[NewAuditRecord]) -> Result<usize, StoreError> {
            Ok(0)
        }
        async fn find_for_resource(
            &self,
            _: &ResourceQuery,
        ) -> Result<Vec<AuditRecord>, StoreError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
        async fn list(&self, opts: &AuditListOptions) -> Result<AuditPage, StoreError> {
            Ok(AuditPage::new(0, opts, Vec::new()))
        }
    }

    #[tokio::test]
    async fn fetch_timeout_fails_clean() {
        let service = LifecycleService::new(Arc::new(SlowStore))
            .with_fetch_timeout(std::time::Duration::from_millis(20));
        let err = service
            .resource_lifecycle_parts("", "v1", "ConfigMap", None, "cfg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Store {
                source: StoreError::Timeout,
                ..
            }
        ));
    }
}
