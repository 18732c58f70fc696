//! Reference normalization and the two reference validators.
//!
//! References may be written as a bare name or as a record. Both forms are
//! resolved into one typed record per category, after the deprecated aliases
//! (`configmap_refs`, `persistence`) have been folded into the current fields.

use super::diagnostics::{DeprecationNotice, Diagnostics};
use super::models::{
    K8sResourceRef, PersistenceConfig, RefEntry, RefKind, SpecError, StoreRef,
    UnknownFieldBehavior, ValidationMode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub const SECRET_REFS: &str = "secret_refs";
pub const CONFIG_MAP_REFS: &str = "config_map_refs";
pub const CONFIGMAP_REFS: &str = "configmap_refs";
pub const DATA_REFS: &str = "data_refs";
pub const ARTIFACT_REFS: &str = "artifact_refs";
pub const PERSISTENCE: &str = "persistence";

/// Canonical record a reference entry resolves to.
pub trait RefRecord: DeserializeOwned {
    const KIND: RefKind;
    const FIELDS: &'static [&'static str];

    /// Record for a bare-name shorthand.
    fn from_name(name: String) -> Self;
}

impl RefRecord for K8sResourceRef {
    const KIND: RefKind = RefKind::K8sResource;
    const FIELDS: &'static [&'static str] = &["name", "mount_path", "items"];

    fn from_name(name: String) -> Self {
        K8sResourceRef {
            name,
            mount_path: None,
            items: None,
        }
    }
}

impl RefRecord for StoreRef {
    const KIND: RefKind = RefKind::Persistence;
    const FIELDS: &'static [&'static str] = &["name", "init", "paths"];

    // Stores are initialized unless the record says otherwise.
    fn from_name(name: String) -> Self {
        StoreRef {
            name,
            init: Some(true),
            paths: None,
        }
    }
}

/// Resolves every entry of `field` into its canonical record.
/// Absent input stays absent and an empty list stays empty.
pub fn normalize_refs<R: RefRecord>(
    field: &str,
    entries: Option<Vec<RefEntry>>,
    unknown: UnknownFieldBehavior,
) -> Result<Option<Vec<R>>, SpecError> {
    let Some(entries) = entries else {
        return Ok(None);
    };

    entries
        .into_iter()
        .map(|entry| normalize_entry(field, entry, unknown))
        .collect::<Result<Vec<R>, SpecError>>()
        .map(Some)
}

fn normalize_entry<R: RefRecord>(
    field: &str,
    entry: RefEntry,
    unknown: UnknownFieldBehavior,
) -> Result<R, SpecError> {
    let shape_error = |reason: String| SpecError::Shape {
        field: field.to_string(),
        kind: R::KIND,
        reason,
    };

    let mut record = match entry {
        RefEntry::Name(name) if name.trim().is_empty() => {
            return Err(shape_error("reference name must not be empty".to_string()))
        }
        RefEntry::Name(name) => return Ok(R::from_name(name)),
        RefEntry::Record(record) => record,
    };

    let unknown_keys: Vec<String> = record
        .keys()
        .filter(|key| !R::FIELDS.contains(&key.as_str()))
        .cloned()
        .collect();
    for key in unknown_keys {
        match unknown {
            UnknownFieldBehavior::Raise => {
                return Err(shape_error(format!("unknown key `{}`", key)));
            }
            UnknownFieldBehavior::Exclude => {
                debug!(field, key = %key, "Excluding unknown key from reference");
                record.remove(&key);
            }
        }
    }

    match record.get("name") {
        Some(Value::String(name)) if name.trim().is_empty() => {
            return Err(shape_error("reference name must not be empty".to_string()));
        }
        None | Some(Value::Null) => {
            return Err(shape_error("missing field `name`".to_string()));
        }
        _ => {}
    }

    serde_json::from_value(Value::Object(record)).map_err(|e| shape_error(e.to_string()))
}

fn is_set<T>(entries: &Option<Vec<T>>) -> bool {
    entries.as_ref().is_some_and(|entries| !entries.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRefsInput {
    pub config_map_refs: Option<Vec<RefEntry>>,
    pub configmap_refs: Option<Vec<RefEntry>>,
    pub secret_refs: Option<Vec<RefEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRefs {
    pub config_map_refs: Option<Vec<K8sResourceRef>>,
    pub secret_refs: Option<Vec<K8sResourceRef>>,
}

/// Folds `configmap_refs` into `config_map_refs` and normalizes the config
/// map and secret references.
pub fn validate_resource_refs(
    input: ResourceRefsInput,
    unknown: UnknownFieldBehavior,
    diagnostics: &mut dyn Diagnostics,
) -> Result<ResourceRefs, SpecError> {
    let ResourceRefsInput {
        mut config_map_refs,
        configmap_refs,
        secret_refs,
    } = input;

    if is_set(&config_map_refs) && is_set(&configmap_refs) {
        return Err(SpecError::ConflictingFields {
            field: CONFIG_MAP_REFS,
            other: CONFIGMAP_REFS,
            message: "You should only use `config_map_refs`.".to_string(),
        });
    }

    if is_set(&configmap_refs) {
        diagnostics.deprecated(DeprecationNotice::new(
            CONFIGMAP_REFS,
            Some(CONFIG_MAP_REFS),
            "`configmap_refs` is deprecated and will be removed, use `config_map_refs` instead.",
        ));
        config_map_refs = configmap_refs;
    }

    Ok(ResourceRefs {
        config_map_refs: normalize_refs(CONFIG_MAP_REFS, config_map_refs, unknown)?,
        secret_refs: normalize_refs(SECRET_REFS, secret_refs, unknown)?,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceInput {
    pub persistence: Option<PersistenceConfig>,
    pub data_refs: Option<Vec<RefEntry>>,
    pub artifact_refs: Option<Vec<RefEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceRefs {
    pub data_refs: Option<Vec<StoreRef>>,
    pub artifact_refs: Option<Vec<StoreRef>>,
    /// Legacy block handed back to the caller. Always `None` in schema mode,
    /// where it has been migrated onto the split fields.
    pub persistence: Option<PersistenceConfig>,
}

/// Rejects `persistence` combined with the split fields, migrates it in
/// schema mode, then normalizes data and artifact references.
pub fn validate_persistence(
    input: PersistenceInput,
    mode: ValidationMode,
    unknown: UnknownFieldBehavior,
    diagnostics: &mut dyn Diagnostics,
) -> Result<PersistenceRefs, SpecError> {
    let PersistenceInput {
        mut persistence,
        mut data_refs,
        mut artifact_refs,
    } = input;

    if persistence.is_some() && (is_set(&data_refs) || is_set(&artifact_refs)) {
        let other = if is_set(&data_refs) {
            DATA_REFS
        } else {
            ARTIFACT_REFS
        };
        return Err(SpecError::ConflictingFields {
            field: PERSISTENCE,
            other,
            message: "You cannot use `persistence` and `data_refs` or `artifact_refs`."
                .to_string(),
        });
    }

    if mode == ValidationMode::Schema {
        if let Some(legacy) = persistence.take() {
            diagnostics.deprecated(DeprecationNotice::new(
                PERSISTENCE,
                Some("data_refs/artifact_refs"),
                "`persistence` is deprecated and will be removed, use `data_refs` and/or `artifact_refs` instead.",
            ));
            data_refs = data_refs.or(legacy.data);
            artifact_refs = artifact_refs.or_else(|| {
                Some(
                    legacy
                        .outputs
                        .unwrap_or_default()
                        .into_iter()
                        .flatten()
                        .map(RefEntry::Name)
                        .collect(),
                )
            });
        }
    }

    Ok(PersistenceRefs {
        data_refs: normalize_refs(DATA_REFS, data_refs, unknown)?,
        artifact_refs: normalize_refs(ARTIFACT_REFS, artifact_refs, unknown)?,
        persistence,
    })
}
