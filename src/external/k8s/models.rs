use crate::config::Config;
use kube::api::LogParams;
use serde::Serialize;
use thiserror::Error;

const MAX_NAME_LENGTH: usize = 253;

/// Pod and container whose process output is read.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub pod_id: String,
    pub container_name: String,
    pub namespace: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogTargetError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} is longer than 253 characters")]
    TooLong(&'static str),
    #[error("{field} `{value}` is not a valid Kubernetes name")]
    InvalidName { field: &'static str, value: String },
}

fn check_name(field: &'static str, value: &str) -> Result<(), LogTargetError> {
    if value.is_empty() {
        return Err(LogTargetError::Empty(field));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(LogTargetError::TooLong(field));
    }

    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_ends = value
        .chars()
        .next()
        .zip(value.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if !valid_chars || !valid_ends {
        return Err(LogTargetError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl LogTarget {
    pub fn new(
        pod_id: impl Into<String>,
        container_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, LogTargetError> {
        let target = LogTarget {
            pod_id: pod_id.into(),
            container_name: container_name.into(),
            namespace: namespace.into(),
        };
        check_name("pod id", &target.pod_id)?;
        check_name("container name", &target.container_name)?;
        check_name("namespace", &target.namespace)?;
        Ok(target)
    }

    /// Job container in the configured namespace.
    pub fn for_job(pod_id: impl Into<String>, config: &Config) -> Result<Self, LogTargetError> {
        Self::new(pod_id, &config.container_name_job, &config.kube_namespace)
    }

    pub(super) fn log_params(&self, follow: bool) -> LogParams {
        LogParams {
            container: Some(self.container_name.clone()),
            follow,
            ..Default::default()
        }
    }
}

/// Splits a log snapshot into lines.
pub(super) fn split_log_lines(logs: &str) -> Vec<String> {
    logs.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environments::models::UnknownFieldBehavior;

    #[test]
    fn test_log_target_accepts_k8s_names() {
        let target = LogTarget::new("job-1234-0-0", "job", "polyaxon.dev").unwrap();
        assert_eq!(target.pod_id, "job-1234-0-0");
    }

    #[test]
    fn test_log_target_rejects_bad_names() {
        assert_eq!(
            LogTarget::new("", "job", "default"),
            Err(LogTargetError::Empty("pod id"))
        );
        assert!(matches!(
            LogTarget::new("Pod_1", "job", "default"),
            Err(LogTargetError::InvalidName { field: "pod id", .. })
        ));
        assert!(matches!(
            LogTarget::new("pod", "-job", "default"),
            Err(LogTargetError::InvalidName { field: "container name", .. })
        ));
        assert_eq!(
            LogTarget::new("pod", "job", "n".repeat(254)),
            Err(LogTargetError::TooLong("namespace"))
        );
    }

    #[test]
    fn test_for_job_uses_configured_container() {
        let config = Config {
            kube_namespace: "experiments".to_string(),
            container_name_job: "main".to_string(),
            kube_config: None,
            unknown_field_behavior: UnknownFieldBehavior::Exclude,
            gpu_resource_key: "nvidia.com/gpu".to_string(),
            tpu_resource_key: "cloud-tpus.google.com/v2".to_string(),
        };
        let target = LogTarget::for_job("pod-a", &config).unwrap();
        assert_eq!(target.container_name, "main");
        assert_eq!(target.namespace, "experiments");
    }

    #[test]
    fn test_log_params_select_container() {
        let target = LogTarget::new("pod-a", "job", "default").unwrap();
        let params = target.log_params(true);
        assert_eq!(params.container.as_deref(), Some("job"));
        assert!(params.follow);
        assert!(!target.log_params(false).follow);
    }

    #[test]
    fn test_split_log_lines() {
        assert_eq!(split_log_lines("a\nb\n"), vec!["a", "b"]);
        assert!(split_log_lines("").is_empty());
    }
}
