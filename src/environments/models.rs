use k8s_openapi::api::core::v1::ResourceRequirements;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{formats::PreferMany, serde_as, OneOrMany};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque key-value mapping as decoded from the request body.
pub type Mapping = Map<String, Value>;

/// One `env_vars` entry, always exactly a name/value pair.
pub type EnvVarPair = (Value, Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldBehavior {
    Raise,
    #[default]
    Exclude,
}

impl FromStr for UnknownFieldBehavior {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "exclude" => Ok(Self::Exclude),
            other => Err(format!("unknown field behavior `{}`", other)),
        }
    }
}

/// Whether the environment is being built from an untyped mapping through the
/// schema, or directly from an already typed [`RawEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Schema,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    K8sResource,
    Persistence,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::K8sResource => write!(f, "K8S resource"),
            RefKind::Persistence => write!(f, "Persistence"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("{message}")]
    ConflictingFields {
        field: &'static str,
        other: &'static str,
        message: String,
    },
    #[error("{kind} field `{field}` is not valid: {reason}")]
    Shape {
        field: String,
        kind: RefKind,
        reason: String,
    },
    #[error("Field `{field}` is not valid: {reason}")]
    Type { field: String, reason: String },
}

impl SpecError {
    pub(crate) fn type_error(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        SpecError::Type {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// The input field the error was raised for.
    pub fn field(&self) -> &str {
        match self {
            SpecError::ConflictingFields { field, .. } => field,
            SpecError::Shape { field, .. } => field,
            SpecError::Type { field, .. } => field,
        }
    }
}

/// A reference as written by the user: either a bare name or a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefEntry {
    Name(String),
    Record(Mapping),
}

impl From<&str> for RefEntry {
    fn from(name: &str) -> Self {
        RefEntry::Name(name.to_string())
    }
}

/// Config map or secret mounted into the pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

/// Data or artifact store mounted into the pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

/// Deprecated combined `persistence` block, superseded by `data_refs` and
/// `artifact_refs`.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<RefEntry>>,
    #[serde_as(as = "Option<OneOrMany<_, PreferMany>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Option<String>>>,
}

/// Container resources after migration.
///
/// `Unvalidated` holds input that matched neither the legacy pod shape nor
/// the container shape; it is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceSpec {
    Container(ResourceRequirements),
    Unvalidated(Value),
}

impl ResourceSpec {
    pub fn container(&self) -> Option<&ResourceRequirements> {
        match self {
            ResourceSpec::Container(requirements) => Some(requirements),
            ResourceSpec::Unvalidated(_) => None,
        }
    }
}

/// Loosely typed environment: every field has passed its type check but none
/// of the aliasing, migration or cross-field rules have run yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEnvironment {
    pub index: Option<i64>,
    pub resources: Option<Mapping>,
    pub labels: Option<Mapping>,
    pub annotations: Option<Mapping>,
    pub node_selector: Option<Mapping>,
    pub affinity: Option<Mapping>,
    pub tolerations: Option<Vec<Mapping>>,
    pub service_account: Option<String>,
    pub image_pull_secrets: Option<Vec<String>>,
    pub max_restarts: Option<i64>,
    pub max_retries: Option<i64>,
    pub restart_policy: Option<String>,
    pub ttl: Option<i64>,
    pub timeout: Option<i64>,
    pub env_vars: Option<Vec<Vec<Value>>>,
    pub secret_refs: Option<Vec<RefEntry>>,
    pub config_map_refs: Option<Vec<RefEntry>>,
    pub configmap_refs: Option<Vec<RefEntry>>,
    pub data_refs: Option<Vec<RefEntry>>,
    pub artifact_refs: Option<Vec<RefEntry>>,
    pub outputs: Option<Value>,
    pub persistence: Option<PersistenceConfig>,
    pub security_context: Option<Mapping>,
}

/// Canonical pod environment. Only constructed through
/// [`EnvironmentConfig::new`] or the environment schema, so every instance
/// has passed validation and migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct EnvironmentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) resources: Option<ResourceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) labels: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) annotations: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) node_selector: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) affinity: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tolerations: Option<Vec<Mapping>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) service_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) image_pull_secrets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) restart_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) ttl: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) env_vars: Option<Vec<EnvVarPair>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) secret_refs: Option<Vec<K8sResourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) config_map_refs: Option<Vec<K8sResourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) data_refs: Option<Vec<StoreRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) artifact_refs: Option<Vec<StoreRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) security_context: Option<Mapping>,
}

impl EnvironmentConfig {
    pub fn index(&self) -> Option<i64> {
        self.index
    }

    pub fn resources(&self) -> Option<&ResourceSpec> {
        self.resources.as_ref()
    }

    pub fn labels(&self) -> Option<&Mapping> {
        self.labels.as_ref()
    }

    pub fn annotations(&self) -> Option<&Mapping> {
        self.annotations.as_ref()
    }

    pub fn node_selector(&self) -> Option<&Mapping> {
        self.node_selector.as_ref()
    }

    pub fn affinity(&self) -> Option<&Mapping> {
        self.affinity.as_ref()
    }

    pub fn tolerations(&self) -> Option<&[Mapping]> {
        self.tolerations.as_deref()
    }

    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref()
    }

    pub fn image_pull_secrets(&self) -> Option<&[String]> {
        self.image_pull_secrets.as_deref()
    }

    pub fn max_retries(&self) -> Option<i64> {
        self.max_retries
    }

    pub fn restart_policy(&self) -> Option<&str> {
        self.restart_policy.as_deref()
    }

    pub fn ttl(&self) -> Option<i64> {
        self.ttl
    }

    pub fn timeout(&self) -> Option<i64> {
        self.timeout
    }

    pub fn env_vars(&self) -> Option<&[EnvVarPair]> {
        self.env_vars.as_deref()
    }

    pub fn secret_refs(&self) -> Option<&[K8sResourceRef]> {
        self.secret_refs.as_deref()
    }

    pub fn config_map_refs(&self) -> Option<&[K8sResourceRef]> {
        self.config_map_refs.as_deref()
    }

    pub fn data_refs(&self) -> Option<&[StoreRef]> {
        self.data_refs.as_deref()
    }

    pub fn artifact_refs(&self) -> Option<&[StoreRef]> {
        self.artifact_refs.as_deref()
    }

    pub fn security_context(&self) -> Option<&Mapping> {
        self.security_context.as_ref()
    }
}

/// Name of the JSON type of `value`, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
