//! Stored audit records and listing options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 0;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Audit record ready to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditRecord {
    pub audit_id: String,
    pub level: String,
    pub stage: String,
    pub verb: String,
    pub user: String,
    pub user_agent: String,
    pub request_timestamp: DateTime<Utc>,
    pub stage_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub subresource: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    /// The full audit event document as received (JSON text).
    pub raw: String,
}

/// One stored audit record. `id` increases with insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewAuditRecord,
}

impl AuditRecord {
    pub fn new(id: i64, record: NewAuditRecord) -> Self {
        Self { id, record }
    }

    pub fn verb(&self) -> &str {
        &self.record.verb
    }

    pub fn raw(&self) -> &str {
        &self.record.raw
    }
}

/// Filter + pagination for listing audit records (ascending by id).
#[derive(Debug, Clone, Default)]
pub struct AuditListOptions {
    pub level: Option<String>,
    pub stage: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl AuditListOptions {
    /// Completed RequestResponse events, the dashboard's default listing.
    pub fn completed_request_response(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            level: Some("RequestResponse".to_string()),
            stage: Some("ResponseComplete".to_string()),
            page,
            page_size,
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    /// Never zero.
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    /// (offset, limit) for the store query.
    pub fn offset_limit(&self) -> (usize, usize) {
        let size = self.page_size() as usize;
        (self.page() as usize * size, size)
    }

    pub fn matches(&self, record: &NewAuditRecord) -> bool {
        self.level.as_deref().map_or(true, |l| record.level == l)
            && self.stage.as_deref().map_or(true, |s| record.stage == s)
    }
}

/// One page of audit records plus paging metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub rows: Vec<AuditRecord>,
}

impl AuditPage {
    pub fn new(total: usize, opts: &AuditListOptions, rows: Vec<AuditRecord>) -> Self {
        let page = opts.page();
        let page_size = opts.page_size();
        Self {
            total,
            page,
            page_size,
            total_pages: total / page_size as usize + 1,
            has_next_page: total > (page as usize + 1) * page_size as usize,
            has_previous_page: page > 0,
            rows,
        }
    }
}
