use super::models::{value_kind, EnvironmentConfig, Mapping, SpecError};
use super::schema::ENV_VARS;
use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, LocalObjectReference, PodSecurityContext, ResourceRequirements, Toleration,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

fn convert<T: DeserializeOwned>(field: &str, value: Value) -> Result<T, SpecError> {
    serde_json::from_value(value).map_err(|e| SpecError::type_error(field, e))
}

fn string_map(field: &str, map: &Mapping) -> Result<BTreeMap<String, String>, SpecError> {
    map.iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key.clone(), text.clone())),
            other => Err(SpecError::type_error(
                field,
                format!("value of `{}` must be a string, found {}", key, value_kind(other)),
            )),
        })
        .collect()
}

impl EnvironmentConfig {
    /// Container env vars. Names must be strings; values that are not strings
    /// are passed JSON-encoded and null leaves the value unset.
    pub fn container_env(&self) -> Result<Vec<EnvVar>, SpecError> {
        self.env_vars()
            .unwrap_or_default()
            .iter()
            .map(|(name, value)| {
                let Value::String(name) = name else {
                    return Err(SpecError::type_error(
                        ENV_VARS,
                        format!("variable names must be strings, found {}", value_kind(name)),
                    ));
                };
                let value = match value {
                    Value::Null => None,
                    Value::String(text) => Some(text.clone()),
                    other => Some(other.to_string()),
                };
                Ok(EnvVar {
                    name: name.clone(),
                    value,
                    ..Default::default()
                })
            })
            .collect()
    }

    pub fn container_resources(&self) -> Option<&ResourceRequirements> {
        self.resources().and_then(|resources| resources.container())
    }

    pub fn pod_image_pull_secrets(&self) -> Vec<LocalObjectReference> {
        self.image_pull_secrets()
            .unwrap_or_default()
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect()
    }

    pub fn pod_tolerations(&self) -> Result<Vec<Toleration>, SpecError> {
        self.tolerations()
            .unwrap_or_default()
            .iter()
            .map(|toleration| convert("tolerations", Value::Object(toleration.clone())))
            .collect()
    }

    pub fn pod_node_selector(&self) -> Result<Option<BTreeMap<String, String>>, SpecError> {
        self.node_selector()
            .map(|selector| string_map("node_selector", selector))
            .transpose()
    }

    pub fn pod_labels(&self) -> Result<Option<BTreeMap<String, String>>, SpecError> {
        self.labels()
            .map(|labels| string_map("labels", labels))
            .transpose()
    }

    pub fn pod_annotations(&self) -> Result<Option<BTreeMap<String, String>>, SpecError> {
        self.annotations()
            .map(|annotations| string_map("annotations", annotations))
            .transpose()
    }

    pub fn pod_affinity(&self) -> Result<Option<Affinity>, SpecError> {
        self.affinity()
            .map(|affinity| convert("affinity", Value::Object(affinity.clone())))
            .transpose()
    }

    pub fn pod_security_context(&self) -> Result<Option<PodSecurityContext>, SpecError> {
        self.security_context()
            .map(|context| convert("security_context", Value::Object(context.clone())))
            .transpose()
    }
}
