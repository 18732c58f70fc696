use crate::environments::models::UnknownFieldBehavior;
use crate::environments::schema::SchemaOptions;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

pub const DEFAULT_GPU_RESOURCE_KEY: &str = "nvidia.com/gpu";
pub const DEFAULT_TPU_RESOURCE_KEY: &str = "cloud-tpus.google.com/v2";

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub kube_namespace: String,
    pub container_name_job: String,
    pub kube_config: Option<String>,
    pub unknown_field_behavior: UnknownFieldBehavior,
    pub gpu_resource_key: String,
    pub tpu_resource_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok(); // Load from .env file if available

        let unknown_field_behavior = match env::var("ENV_SPEC_UNKNOWN_FIELDS") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %value,
                    "Unrecognised ENV_SPEC_UNKNOWN_FIELDS, falling back to `exclude`"
                );
                UnknownFieldBehavior::Exclude
            }),
            Err(_) => UnknownFieldBehavior::Exclude,
        };

        Config {
            kube_namespace: env::var("K8S_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            container_name_job: env::var("CONTAINER_NAME_JOB")
                .unwrap_or_else(|_| "job".to_string()),
            kube_config: env::var("KUBECONFIG_PATH").ok(),
            unknown_field_behavior,
            gpu_resource_key: env::var("K8S_GPU_RESOURCE_KEY")
                .unwrap_or_else(|_| DEFAULT_GPU_RESOURCE_KEY.to_string()),
            tpu_resource_key: env::var("K8S_TPU_RESOURCE_KEY")
                .unwrap_or_else(|_| DEFAULT_TPU_RESOURCE_KEY.to_string()),
        }
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            unknown_field_behavior: self.unknown_field_behavior,
            gpu_resource_key: self.gpu_resource_key.clone(),
            tpu_resource_key: self.tpu_resource_key.clone(),
        }
    }
}
