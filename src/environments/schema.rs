//! Environment schema: field-level type checks followed by the reference,
//! persistence and resource passes, producing an [`EnvironmentConfig`].
//!
//! Each pass takes ownership of the fields it resolves and hands back the
//! canonical values; the first error aborts the whole construction.

use super::diagnostics::{DeprecationNotice, Diagnostics, TracingDiagnostics};
use super::models::{
    value_kind, EnvVarPair, EnvironmentConfig, Mapping, RawEnvironment, SpecError,
    UnknownFieldBehavior, ValidationMode,
};
use super::refs::{
    validate_persistence, validate_resource_refs, PersistenceInput, ResourceRefsInput,
    PERSISTENCE,
};
use super::resources::migrate_resources;
use crate::config::{DEFAULT_GPU_RESOURCE_KEY, DEFAULT_TPU_RESOURCE_KEY};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub const ENV_VARS: &str = "env_vars";
pub const MAX_RESTARTS: &str = "max_restarts";
pub const MAX_RETRIES: &str = "max_retries";
pub const OUTPUTS: &str = "outputs";

pub const KNOWN_FIELDS: &[&str] = &[
    "index",
    "resources",
    "labels",
    "annotations",
    "node_selector",
    "affinity",
    "tolerations",
    "service_account",
    "image_pull_secrets",
    MAX_RESTARTS,
    MAX_RETRIES,
    "restart_policy",
    "ttl",
    "timeout",
    ENV_VARS,
    "secret_refs",
    "config_map_refs",
    "configmap_refs",
    "data_refs",
    "artifact_refs",
    OUTPUTS,
    PERSISTENCE,
    "security_context",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    pub unknown_field_behavior: UnknownFieldBehavior,
    pub gpu_resource_key: String,
    pub tpu_resource_key: String,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            unknown_field_behavior: UnknownFieldBehavior::default(),
            gpu_resource_key: DEFAULT_GPU_RESOURCE_KEY.to_string(),
            tpu_resource_key: DEFAULT_TPU_RESOURCE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentSchema {
    options: SchemaOptions,
}

impl EnvironmentSchema {
    pub fn new(options: SchemaOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Validates an untyped environment mapping into its canonical form.
    pub fn load(
        &self,
        value: Value,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<EnvironmentConfig, SpecError> {
        let raw = self.check_fields(value)?;
        build(raw, ValidationMode::Schema, &self.options, diagnostics)
    }

    pub fn from_json(
        &self,
        input: &str,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<EnvironmentConfig> {
        let value: Value = serde_json::from_str(input).context("Failed to parse JSON")?;
        Ok(self.load(value, diagnostics)?)
    }

    pub fn from_yaml(
        &self,
        input: &str,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<EnvironmentConfig> {
        let value: Value = serde_yaml::from_str(input).context("Failed to parse YAML")?;
        Ok(self.load(value, diagnostics)?)
    }

    /// Checks every declared field against its type and applies the
    /// unknown-field behavior to the rest.
    pub fn check_fields(&self, value: Value) -> Result<RawEnvironment, SpecError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(SpecError::type_error(
                    "environment",
                    format!("expected a mapping, found {}", value_kind(&other)),
                ))
            }
        };

        let raw = RawEnvironment {
            index: take(&mut map, "index")?,
            resources: take(&mut map, "resources")?,
            labels: take(&mut map, "labels")?,
            annotations: take(&mut map, "annotations")?,
            node_selector: take(&mut map, "node_selector")?,
            affinity: take(&mut map, "affinity")?,
            tolerations: take(&mut map, "tolerations")?,
            service_account: take(&mut map, "service_account")?,
            image_pull_secrets: take(&mut map, "image_pull_secrets")?,
            max_restarts: take(&mut map, MAX_RESTARTS)?,
            max_retries: take(&mut map, MAX_RETRIES)?,
            restart_policy: take(&mut map, "restart_policy")?,
            ttl: take(&mut map, "ttl")?,
            timeout: take(&mut map, "timeout")?,
            env_vars: take(&mut map, ENV_VARS)?,
            secret_refs: take(&mut map, "secret_refs")?,
            config_map_refs: take(&mut map, "config_map_refs")?,
            configmap_refs: take(&mut map, "configmap_refs")?,
            data_refs: take(&mut map, "data_refs")?,
            artifact_refs: take(&mut map, "artifact_refs")?,
            outputs: take::<Mapping>(&mut map, OUTPUTS)?.map(Value::Object),
            persistence: take_record(&mut map, PERSISTENCE)?,
            security_context: take(&mut map, "security_context")?,
        };

        for key in map.keys() {
            match self.options.unknown_field_behavior {
                UnknownFieldBehavior::Raise => {
                    return Err(SpecError::type_error(key.as_str(), "unknown field"));
                }
                UnknownFieldBehavior::Exclude => {
                    debug!(field = %key, "Excluding unknown environment field");
                }
            }
        }

        Ok(raw)
    }
}

/// Removes `field` from `map` and checks it against `T`. Null counts as
/// absent.
fn take<T: DeserializeOwned>(map: &mut Mapping, field: &str) -> Result<Option<T>, SpecError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SpecError::type_error(field, e)),
    }
}

/// Like [`take`], but the value must be a mapping before it is read as `T`.
fn take_record<T: DeserializeOwned>(
    map: &mut Mapping,
    field: &str,
) -> Result<Option<T>, SpecError> {
    let Some(record) = take::<Mapping>(map, field)? else {
        return Ok(None);
    };
    serde_json::from_value(Value::Object(record))
        .map(Some)
        .map_err(|e| SpecError::type_error(field, e))
}

fn validate_env_vars(
    env_vars: Option<Vec<Vec<Value>>>,
) -> Result<Option<Vec<EnvVarPair>>, SpecError> {
    let Some(env_vars) = env_vars else {
        return Ok(None);
    };

    env_vars
        .into_iter()
        .enumerate()
        .map(|(position, entry)| match <[Value; 2]>::try_from(entry) {
            Ok([name, value]) => Ok((name, value)),
            Err(entry) => Err(SpecError::type_error(
                ENV_VARS,
                format!(
                    "entry {} must have exactly 2 elements, found {}",
                    position,
                    entry.len()
                ),
            )),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Runs the shared validation pipeline over an already type-checked
/// environment.
pub(crate) fn build(
    raw: RawEnvironment,
    mode: ValidationMode,
    options: &SchemaOptions,
    diagnostics: &mut dyn Diagnostics,
) -> Result<EnvironmentConfig, SpecError> {
    let unknown = options.unknown_field_behavior;

    if raw.max_restarts.is_some() {
        diagnostics.deprecated(DeprecationNotice::new(
            MAX_RESTARTS,
            Some(MAX_RETRIES),
            "`max_restarts` is deprecated and has no effect, use `max_retries`.",
        ));
    }
    if raw.outputs.is_some() {
        diagnostics.deprecated(DeprecationNotice::new(
            OUTPUTS,
            None,
            "`outputs` is deprecated and will be removed, it is ignored.",
        ));
    }

    let env_vars = validate_env_vars(raw.env_vars)?;

    let resource_refs = validate_resource_refs(
        ResourceRefsInput {
            config_map_refs: raw.config_map_refs,
            configmap_refs: raw.configmap_refs,
            secret_refs: raw.secret_refs,
        },
        unknown,
        diagnostics,
    )?;

    let persistence = validate_persistence(
        PersistenceInput {
            persistence: raw.persistence,
            data_refs: raw.data_refs,
            artifact_refs: raw.artifact_refs,
        },
        mode,
        unknown,
        diagnostics,
    )?;
    if persistence.persistence.is_some() {
        diagnostics.deprecated(DeprecationNotice::new(
            PERSISTENCE,
            Some("data_refs/artifact_refs"),
            "`persistence` is ignored when building an environment directly, use `data_refs` and/or `artifact_refs`.",
        ));
    }

    let resources = migrate_resources(raw.resources, options, diagnostics);

    Ok(EnvironmentConfig {
        index: raw.index,
        resources,
        labels: raw.labels,
        annotations: raw.annotations,
        node_selector: raw.node_selector,
        affinity: raw.affinity,
        tolerations: raw.tolerations,
        service_account: raw.service_account,
        image_pull_secrets: raw.image_pull_secrets,
        max_retries: raw.max_retries,
        restart_policy: raw.restart_policy,
        ttl: raw.ttl,
        timeout: raw.timeout,
        env_vars,
        secret_refs: resource_refs.secret_refs,
        config_map_refs: resource_refs.config_map_refs,
        data_refs: persistence.data_refs,
        artifact_refs: persistence.artifact_refs,
        security_context: raw.security_context,
    })
}

impl EnvironmentConfig {
    /// Builds an environment from already typed fields.
    pub fn new(
        raw: RawEnvironment,
        options: &SchemaOptions,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<Self, SpecError> {
        build(raw, ValidationMode::Direct, options, diagnostics)
    }
}

impl TryFrom<Value> for EnvironmentConfig {
    type Error = SpecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        EnvironmentSchema::default().load(value, &mut TracingDiagnostics)
    }
}
