//! Audit webhook normalization: audit.k8s.io `EventList` body -> [`NewAuditRecord`]s.

use chrono::{DateTime, Utc};
use kad_types::NewAuditRecord;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to decode audit event list: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHeader {
    #[serde(default)]
    level: String,
    #[serde(default, rename = "auditID")]
    audit_id: Option<String>,
    #[serde(default)]
    stage: String,
    verb: String,
    #[serde(default)]
    user: UserInfo,
    #[serde(default)]
    user_agent: String,
    request_received_timestamp: DateTime<Utc>,
    #[serde(default)]
    stage_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    object_ref: Option<ObjectRef>,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectRef {
    #[serde(default)]
    api_group: String,
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    resource: String,
    #[serde(default)]
    subresource: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    name: String,
}

/// Decode a webhook body. A body that is not an event list fails as a whole; individual items
/// that lack required fields are skipped with a warning.
pub fn decode_event_list(body: &[u8]) -> Result<Vec<NewAuditRecord>, IngestError> {
    let list: EventList =
        serde_json::from_slice(body).map_err(|e| IngestError::Decode(e.to_string()))?;
    let mut out = Vec::with_capacity(list.items.len());
    for (index, item) in list.items.into_iter().enumerate() {
        match normalize(item) {
            Ok(record) => out.push(record),
            Err(e) => tracing::warn!(index, error = %e, "skipping undecodable audit event"),
        }
    }
    Ok(out)
}

fn normalize(item: serde_json::Value) -> Result<NewAuditRecord, serde_json::Error> {
    let header = EventHeader::deserialize(&item)?;
    let object_ref = header.object_ref.unwrap_or_default();
    Ok(NewAuditRecord {
        audit_id: header
            .audit_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        level: header.level,
        stage: header.stage,
        verb: header.verb,
        user: header.user.username,
        user_agent: header.user_agent,
        request_timestamp: header.request_received_timestamp,
        stage_timestamp: header
            .stage_timestamp
            .unwrap_or(header.request_received_timestamp),
        api_version: qualified_api_version(&object_ref.api_group, &object_ref.api_version),
        api_group: object_ref.api_group,
        resource: object_ref.resource,
        subresource: object_ref.subresource,
        namespace: object_ref.namespace,
        name: object_ref.name,
        raw: item.to_string(),
    })
}

/// Audit object references carry the bare version; lookups use `group/version`.
fn qualified_api_version(group: &str, version: &str) -> String {
    if group.is_empty() || version.contains('/') || version.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}
