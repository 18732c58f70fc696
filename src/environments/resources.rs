use super::diagnostics::{DeprecationNotice, Diagnostics};
use super::models::{Mapping, ResourceSpec};
use super::schema::SchemaOptions;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

pub const RESOURCES: &str = "resources";

const CONTAINER_KEYS: &[&str] = &["limits", "requests", "claims"];
const QUANTITY_KEYS: &[&str] = &["limits", "requests"];

/// Amount in the legacy pod resources block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyQuantity {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LegacyQuantity {
    /// Bare numbers take `unit`, strings are already quantities.
    fn to_quantity(&self, unit: &str) -> Quantity {
        match self {
            LegacyQuantity::Integer(value) => Quantity(format!("{}{}", value, unit)),
            LegacyQuantity::Float(value) => Quantity(format!("{}{}", value, unit)),
            LegacyQuantity::Text(value) => Quantity(value.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceBounds {
    #[serde(default)]
    pub requests: Option<LegacyQuantity>,
    #[serde(default)]
    pub limits: Option<LegacyQuantity>,
}

/// A scalar sets request and limit to the same amount.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyResourceEntry {
    Scalar(LegacyQuantity),
    Bounds(ResourceBounds),
}

impl LegacyResourceEntry {
    fn into_bounds(self) -> (Option<LegacyQuantity>, Option<LegacyQuantity>) {
        match self {
            LegacyResourceEntry::Scalar(amount) => (Some(amount.clone()), Some(amount)),
            LegacyResourceEntry::Bounds(bounds) => (bounds.requests, bounds.limits),
        }
    }
}

/// Simplified per-pod resources, superseded by the container shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PodResources {
    #[serde(default)]
    pub cpu: Option<LegacyResourceEntry>,
    #[serde(default)]
    pub memory: Option<LegacyResourceEntry>,
    #[serde(default)]
    pub gpu: Option<LegacyResourceEntry>,
    #[serde(default)]
    pub tpu: Option<LegacyResourceEntry>,
}

impl PodResources {
    /// Maps each legacy entry onto the request and limit of its container
    /// resource key. Memory given as a bare number is in mebibytes.
    pub fn into_container_resources(
        self,
        gpu_resource_key: &str,
        tpu_resource_key: &str,
    ) -> ResourceRequirements {
        let mut requests = BTreeMap::new();
        let mut limits = BTreeMap::new();

        let entries = [
            ("cpu", self.cpu, ""),
            ("memory", self.memory, "Mi"),
            (gpu_resource_key, self.gpu, ""),
            (tpu_resource_key, self.tpu, ""),
        ];
        for (key, entry, unit) in entries {
            let Some(entry) = entry else {
                continue;
            };
            let (request, limit) = entry.into_bounds();
            if let Some(request) = request {
                requests.insert(key.to_string(), request.to_quantity(unit));
            }
            if let Some(limit) = limit {
                limits.insert(key.to_string(), limit.to_quantity(unit));
            }
        }

        ResourceRequirements {
            requests: (!requests.is_empty()).then_some(requests),
            limits: (!limits.is_empty()).then_some(limits),
            ..Default::default()
        }
    }
}

/// Normalizes a `resources` block onto the container shape.
///
/// Input parsing as the legacy pod shape is converted with a deprecation
/// notice. Anything else is assumed to already be in container shape; input
/// that turns out to be neither is kept as [`ResourceSpec::Unvalidated`]
/// rather than rejected. Blocks that carry no quantities at all are dropped.
pub fn migrate_resources(
    resources: Option<Mapping>,
    options: &SchemaOptions,
    diagnostics: &mut dyn Diagnostics,
) -> Option<ResourceSpec> {
    let resources = Value::Object(resources.filter(|map| !map.is_empty())?);

    let spec = match PodResources::deserialize(&resources) {
        Ok(legacy) => {
            diagnostics.deprecated(DeprecationNotice::new(
                RESOURCES,
                None,
                "`resources` should use the k8s container format (`requests`/`limits`).",
            ));
            ResourceSpec::Container(legacy.into_container_resources(
                &options.gpu_resource_key,
                &options.tpu_resource_key,
            ))
        }
        Err(_) => assume_container(resources),
    };

    let is_empty = matches!(
        &spec,
        ResourceSpec::Container(requirements) if *requirements == ResourceRequirements::default()
    );
    (!is_empty).then_some(spec)
}

fn assume_container(resources: Value) -> ResourceSpec {
    let is_container_shape = resources
        .as_object()
        .is_some_and(|map| map.keys().all(|key| CONTAINER_KEYS.contains(&key.as_str())));

    if is_container_shape {
        let mut coerced = resources.clone();
        stringify_quantities(&mut coerced);
        if let Ok(requirements) = ResourceRequirements::deserialize(&coerced) {
            return ResourceSpec::Container(requirements);
        }
    }

    warn!(
        resources = %resources,
        "Resources match neither the pod nor the container format, keeping them unvalidated"
    );
    ResourceSpec::Unvalidated(resources)
}

// Quantities written as YAML/JSON numbers (`cpu: 2`) are valid k8s
// quantities but `Quantity` only deserializes from strings.
fn stringify_quantities(resources: &mut Value) {
    let Some(map) = resources.as_object_mut() else {
        return;
    };
    for key in QUANTITY_KEYS {
        if let Some(Value::Object(amounts)) = map.get_mut(*key) {
            for amount in amounts.values_mut() {
                if let Value::Number(number) = amount {
                    *amount = Value::String(number.to_string());
                }
            }
        }
    }
}
