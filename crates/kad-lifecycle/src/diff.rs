//! Structural diff between two resource state documents.
//!
//! Nested objects are walked key by key and reported with dot-joined paths. Arrays are
//! compared as whole values: any difference, including reordering, is one `modified`
//! entry at the array's path. Keys containing `.` are not escaped, so `data["a.b"]` and
//! `data.a.b` share the path `data.a.b`.

use kad_types::{DiffEntry, ResourceDiff};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A resource document (apiVersion/kind/metadata/spec/... tree).
pub type Document = Map<String, Value>;

/// Server-maintained metadata keys that are never reported as changes.
pub const VOLATILE_METADATA_FIELDS: [&str; 6] = [
    "resourceVersion",
    "generation",
    "uid",
    "creationTimestamp",
    "selfLink",
    "managedFields",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSide {
    Old,
    New,
}

impl std::fmt::Display for DocumentSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSide::Old => f.write_str("old"),
            DocumentSide::New => f.write_str("new"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("failed to parse {side} document: {reason}")]
    Parse { side: DocumentSide, reason: String },
}

/// Parse YAML (or JSON) source text into a document. Blank text and a YAML `null`
/// document mean "absent".
pub fn parse_document(src: &str, side: DocumentSide) -> Result<Option<Document>, DiffError> {
    if src.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_yaml::from_str(src).map_err(|e| DiffError::Parse {
        side,
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(None),
        Value::Object(doc) => Ok(Some(doc)),
        other => Err(DiffError::Parse {
            side,
            reason: format!(
                "expected a mapping at the document root, found {}",
                kind_of(&other)
            ),
        }),
    }
}

/// Diff two documents given as source text. Either side failing to parse fails the whole call.
pub fn compute_diff_from_str(old_src: &str, new_src: &str) -> Result<ResourceDiff, DiffError> {
    let old = parse_document(old_src, DocumentSide::Old)?;
    let new = parse_document(new_src, DocumentSide::New)?;
    Ok(compute_diff(old.as_ref(), new.as_ref()))
}

/// Diff two optional documents after stripping volatile metadata and `status`.
pub fn compute_diff(old: Option<&Document>, new: Option<&Document>) -> ResourceDiff {
    let old = old.map(strip_volatile);
    let new = new.map(strip_volatile);

    let mut diff = ResourceDiff::default();
    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => flatten_into("", &new, &mut diff.added),
        (Some(old), None) => flatten_into("", &old, &mut diff.removed),
        (Some(old), Some(new)) => diff_maps("", &old, &new, &mut diff),
    }
    diff
}

/// Copy of `doc` without volatile metadata keys (dropping `metadata` if emptied) and
/// without top-level `status`.
pub fn strip_volatile(doc: &Document) -> Document {
    let mut doc = doc.clone();
    if let Some(Value::Object(metadata)) = doc.get_mut("metadata") {
        for field in VOLATILE_METADATA_FIELDS {
            metadata.remove(field);
        }
        if metadata.is_empty() {
            doc.remove("metadata");
        }
    }
    doc.remove("status");
    doc
}

/// Every leaf (non-object value) of `doc` keyed by its dot-joined path.
pub fn flatten(doc: &Document) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", doc, &mut out);
    out
}

fn flatten_into(prefix: &str, map: &Document, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        match value {
            Value::Object(nested) => flatten_into(&path, nested, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

fn diff_maps(prefix: &str, old: &Document, new: &Document, diff: &mut ResourceDiff) {
    for (key, old_value) in old {
        let path = join_path(prefix, key);
        let Some(new_value) = new.get(key) else {
            diff.removed.insert(path, old_value.clone());
            continue;
        };
        match (old_value, new_value) {
            (Value::Object(old_map), Value::Object(new_map)) => {
                diff_maps(&path, old_map, new_map, diff);
            }
            // arrays, scalars and mismatched types compare as whole values
            _ => {
                if !canonical_eq(old_value, new_value) {
                    diff.modified.insert(
                        path.clone(),
                        DiffEntry {
                            path,
                            old_value: old_value.clone(),
                            new_value: new_value.clone(),
                        },
                    );
                }
            }
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            diff.added.insert(join_path(prefix, key), new_value.clone());
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Equality of canonical forms: object key order is ignored, array element order is
/// significant. Integers compare exactly; anything involving a float compares by value, so
/// `3` == `3.0`.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| canonical_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| canonical_eq(l, r)))
        }
        _ => false,
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    if x.is_f64() || y.is_f64() {
        return x.as_f64() == y.as_f64();
    }
    // one side negative, the other above i64::MAX
    false
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
