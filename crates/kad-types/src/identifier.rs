//! Resource identity: parsing of the compact `group-version-kind` URL encoding and
//! derivation of event-store query parameters.

use serde::{Deserialize, Serialize};

/// Namespace token that marks a cluster-scoped resource in URLs.
pub const CLUSTER_SCOPED_SENTINEL: &str = "_cluster";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("invalid GVK format: {0}")]
    InvalidIdentifier(String),
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("failed to decode {field}: {reason}")]
    Decode { field: &'static str, reason: String },
}

impl IdentifierError {
    fn empty(field: &'static str) -> Self {
        IdentifierError::Validation {
            field,
            message: format!("{} cannot be empty", field),
        }
    }
}

/// Uniquely identifies one Kubernetes resource. Immutable once built; only the validating
/// constructors produce one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    api_group: String,
    version: String,
    kind: String,
    namespace: String,
    name: String,
}

/// Event-store lookup parameters derived from a [`ResourceIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub api_group: String,
    /// `group/version`, or bare `version` for the core group.
    pub api_version: String,
    /// Lower-case plural resource name (e.g. `deployments`).
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentifier {
    /// Build an identifier from already separated parts. `namespace` of `None`, `""` or
    /// [`CLUSTER_SCOPED_SENTINEL`] means cluster-scoped. Values are taken verbatim (no decoding).
    pub fn new(
        api_group: &str,
        version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Self, IdentifierError> {
        validate_required(kind, version, name)?;
        let namespace = match namespace {
            Some(ns) if ns != CLUSTER_SCOPED_SENTINEL => ns.to_string(),
            _ => String::new(),
        };
        Ok(Self {
            api_group: api_group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            namespace,
            name: name.to_string(),
        })
    }

    /// Parse URL segments: `gvk` is `version-Kind`, `group-version-Kind`, `core-version-Kind`
    /// or `dotted-group-parts-version-Kind` (e.g. `networking-k8s-io-v1-NetworkPolicy`).
    /// `name` and `namespace` are percent-decoded.
    pub fn parse_from_url(gvk: &str, namespace: &str, name: &str) -> Result<Self, IdentifierError> {
        let parts: Vec<&str> = gvk.split('-').collect();
        let (api_group, version, kind) = match parts.as_slice() {
            [] | [_] => return Err(IdentifierError::InvalidIdentifier(gvk.to_string())),
            [version, kind] => (String::new(), *version, *kind),
            [group, version, kind] => {
                let group = if *group == "core" { "" } else { *group };
                (group.to_string(), *version, *kind)
            }
            [group @ .., version, kind] => (group.join("."), *version, *kind),
        };

        validate_required(kind, version, name)?;

        let name = percent_decode("name", name)?;
        if name.is_empty() {
            return Err(IdentifierError::empty("name"));
        }

        let namespace = if namespace.is_empty() || namespace == CLUSTER_SCOPED_SENTINEL {
            String::new()
        } else {
            percent_decode("namespace", namespace)?
        };

        Ok(Self {
            api_group,
            version: version.to_string(),
            kind: kind.to_string(),
            namespace,
            name,
        })
    }

    pub fn api_group(&self) -> &str {
        &self.api_group
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Empty for cluster-scoped resources.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Full apiVersion as it appears in audit object references.
    pub fn api_version(&self) -> String {
        if self.api_group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.api_group, self.version)
        }
    }

    pub fn to_query(&self) -> ResourceQuery {
        ResourceQuery {
            api_group: self.api_group.clone(),
            api_version: self.api_version(),
            resource: pluralize(&self.kind),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)?;
        if !self.namespace.is_empty() {
            write!(f, " {}/{}", self.namespace, self.name)
        } else {
            write!(f, " {}", self.name)
        }
    }
}

/// Order matters: callers rely on kind, then version, then name being reported first.
fn validate_required(kind: &str, version: &str, name: &str) -> Result<(), IdentifierError> {
    if kind.is_empty() {
        return Err(IdentifierError::empty("kind"));
    }
    if version.is_empty() {
        return Err(IdentifierError::empty("version"));
    }
    if name.is_empty() {
        return Err(IdentifierError::empty("name"));
    }
    Ok(())
}

fn percent_decode(field: &'static str, raw: &str) -> Result<String, IdentifierError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(IdentifierError::Decode {
                    field,
                    reason: format!("invalid escape at byte {} in {:?}", i, raw),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| IdentifierError::Decode {
            field,
            reason: e.to_string(),
        })
}

/// Kind -> lower-case plural resource name.
pub fn pluralize(kind: &str) -> String {
    let lower = kind.to_lowercase();
    let known = match lower.as_str() {
        "configmap" => "configmaps",
        "secret" => "secrets",
        "service" => "services",
        "deployment" => "deployments",
        "statefulset" => "statefulsets",
        "daemonset" => "daemonsets",
        "replicaset" => "replicasets",
        "pod" => "pods",
        "namespace" => "namespaces",
        "node" => "nodes",
        "persistentvolume" => "persistentvolumes",
        "persistentvolumeclaim" => "persistentvolumeclaims",
        "storageclass" => "storageclasses",
        "ingress" => "ingresses",
        "networkpolicy" => "networkpolicies",
        "poddisruptionbudget" => "poddisruptionbudgets",
        "role" => "roles",
        "rolebinding" => "rolebindings",
        "clusterrole" => "clusterroles",
        "clusterrolebinding" => "clusterrolebindings",
        "serviceaccount" => "serviceaccounts",
        "customresourcedefinition" => "customresourcedefinitions",
        _ => return format!("{}s", lower),
    };
    known.to_string()
}
