use envspec::environments::models::{K8sResourceRef, ResourceSpec, StoreRef, UnknownFieldBehavior};
use envspec::environments::{
    DeprecationNotice, EnvironmentConfig, EnvironmentSchema, SchemaOptions, SpecError,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn load(value: Value) -> (Result<EnvironmentConfig, SpecError>, Vec<DeprecationNotice>) {
    let mut notices: Vec<DeprecationNotice> = Vec::new();
    let result = EnvironmentSchema::default().load(value, &mut notices);
    (result, notices)
}

fn notice_fields(notices: &[DeprecationNotice]) -> Vec<&'static str> {
    notices.iter().map(|notice| notice.field).collect()
}

fn full_spec() -> Value {
    json!({
        "index": 1,
        "resources": {"cpu": {"requests": 1, "limits": 2}, "memory": {"limits": 4096}, "gpu": 1},
        "labels": {"team": "vision"},
        "annotations": {"owner": "ml"},
        "node_selector": {"pool": "gpu"},
        "affinity": {"nodeAffinity": {}},
        "tolerations": [{"key": "gpu", "operator": "Exists"}],
        "service_account": "trainer",
        "image_pull_secrets": ["registry"],
        "max_retries": 3,
        "restart_policy": "OnFailure",
        "ttl": 600,
        "timeout": 3600,
        "env_vars": [["LOG_LEVEL", "info"], ["WORKERS", 4]],
        "secret_refs": ["aws", {"name": "gcs", "mount_path": "/secrets/gcs"}],
        "configmap_refs": ["settings"],
        "persistence": {"data": ["imagenet"], "outputs": "results"},
        "security_context": {"runAsUser": 1000},
    })
}

#[test]
fn conflicting_config_map_aliases_fail() {
    let (result, _) = load(json!({"config_map_refs": ["a"], "configmap_refs": ["b"]}));
    assert!(matches!(
        result,
        Err(SpecError::ConflictingFields { field: "config_map_refs", other: "configmap_refs", .. })
    ));
}

#[test]
fn deprecated_config_map_alias_is_migrated() {
    let (result, notices) = load(json!({"configmap_refs": ["a", {"name": "b", "items": ["x"]}]}));
    let env = result.unwrap();

    assert_eq!(
        env.config_map_refs().unwrap(),
        &[
            K8sResourceRef {
                name: "a".to_string(),
                mount_path: None,
                items: None,
            },
            K8sResourceRef {
                name: "b".to_string(),
                mount_path: None,
                items: Some(vec!["x".to_string()]),
            },
        ]
    );
    let serialized = serde_json::to_value(&env).unwrap();
    assert!(serialized.get("configmap_refs").is_none());
    assert_eq!(notice_fields(&notices), vec!["configmap_refs"]);
}

#[test]
fn persistence_with_split_refs_fails() {
    let (result, _) = load(json!({"persistence": {"data": ["d"]}, "data_refs": ["d2"]}));
    assert!(matches!(
        result,
        Err(SpecError::ConflictingFields { field: "persistence", other: "data_refs", .. })
    ));

    let (result, _) = load(json!({"persistence": {}, "artifact_refs": [{"name": "a"}]}));
    assert!(matches!(result, Err(SpecError::ConflictingFields { .. })));
}

#[test]
fn persistence_with_empty_split_refs_migrates() {
    let (result, notices) = load(json!({"persistence": {"data": ["d"]}, "data_refs": []}));
    let env = result.unwrap();
    // An explicitly empty list is kept rather than replaced by the legacy data.
    assert_eq!(env.data_refs(), Some(&[][..]));
    assert_eq!(env.artifact_refs(), Some(&[][..]));
    assert_eq!(notice_fields(&notices), vec!["persistence"]);
}

#[test]
fn bare_names_expand_per_category() {
    let (result, _) = load(json!({"secret_refs": ["my-secret"], "data_refs": ["my-secret"]}));
    let env = result.unwrap();
    let serialized = serde_json::to_value(&env).unwrap();
    assert_eq!(serialized["secret_refs"], json!([{"name": "my-secret"}]));
    assert_eq!(
        serialized["data_refs"],
        json!([{"name": "my-secret", "init": true}])
    );
}

#[test]
fn invalid_reference_record_fails_with_shape_error() {
    let (result, _) = load(json!({"artifact_refs": [{"paths": ["/out"]}]}));
    let err = result.unwrap_err();
    assert!(matches!(err, SpecError::Shape { .. }));
    assert_eq!(err.field(), "artifact_refs");
}

#[test]
fn legacy_resources_migrate_with_notice() {
    let (result, notices) = load(json!({"resources": {"cpu": 1, "memory": "1Gi"}}));
    let env = result.unwrap();
    let container = env.container_resources().unwrap();
    let limits = container.limits.as_ref().unwrap();
    assert_eq!(limits["cpu"].0, "1");
    assert_eq!(limits["memory"].0, "1Gi");
    assert_eq!(notice_fields(&notices), vec!["resources"]);
}

#[test]
fn malformed_resources_pass_through() {
    let malformed = json!({"cpu": {"min": 1}});
    let (result, notices) = load(json!({"resources": malformed.clone()}));
    let env = result.unwrap();
    assert_eq!(env.resources(), Some(&ResourceSpec::Unvalidated(malformed)));
    assert!(env.container_resources().is_none());
    assert!(notices.is_empty());
}

#[test]
fn non_mapping_resources_and_persistence_fail() {
    let (result, notices) = load(json!({"resources": ["lots", 3]}));
    assert!(matches!(result, Err(SpecError::Type { ref field, .. }) if field == "resources"));
    assert!(notices.is_empty());

    let (result, _) = load(json!({"resources": "lots"}));
    assert!(matches!(result, Err(SpecError::Type { ref field, .. }) if field == "resources"));

    let (result, notices) = load(json!({"persistence": [["d1"], "o1"]}));
    assert!(matches!(result, Err(SpecError::Type { ref field, .. }) if field == "persistence"));
    assert!(notices.is_empty());
}

#[test]
fn resources_without_quantities_stay_idempotent() {
    let (result, _) = load(json!({"resources": {"cpu": {}}, "ttl": 60}));
    let first = result.unwrap();
    assert_eq!(first.resources(), None);

    let (result, notices) = load(serde_json::to_value(&first).unwrap());
    assert_eq!(first, result.unwrap());
    assert!(notices.is_empty());
}

#[test]
fn three_element_env_var_fails() {
    let (result, _) = load(json!({"env_vars": [["A", "1", "2"]]}));
    assert!(matches!(result, Err(SpecError::Type { ref field, .. }) if field == "env_vars"));
}

#[test]
fn max_restarts_never_sets_max_retries() {
    let (result, notices) = load(json!({"max_restarts": 10}));
    let env = result.unwrap();
    assert_eq!(env.max_retries(), None);
    assert_eq!(notice_fields(&notices), vec!["max_restarts"]);
}

#[test]
fn full_spec_is_canonicalized() {
    let (result, notices) = load(full_spec());
    let env = result.unwrap();

    assert_eq!(env.index(), Some(1));
    assert_eq!(env.service_account(), Some("trainer"));
    assert_eq!(env.config_map_refs().map(|refs| refs.len()), Some(1));
    assert_eq!(
        env.data_refs().unwrap(),
        &[StoreRef {
            name: "imagenet".to_string(),
            init: Some(true),
            paths: None,
        }]
    );
    assert_eq!(env.artifact_refs().unwrap()[0].name, "results");
    assert_eq!(env.container_env().unwrap().len(), 2);
    assert_eq!(
        notice_fields(&notices),
        vec!["configmap_refs", "persistence", "resources"]
    );
}

#[test]
fn validation_is_idempotent() {
    let (result, _) = load(full_spec());
    let first = result.unwrap();

    let serialized = serde_json::to_value(&first).unwrap();
    let (result, notices) = load(serialized.clone());
    let second = result.unwrap();

    assert_eq!(first, second);
    assert_eq!(serde_json::to_value(&second).unwrap(), serialized);
    assert!(notices.is_empty());
}

#[test]
fn deserialize_runs_the_schema() {
    let env: EnvironmentConfig =
        serde_json::from_value(json!({"configmap_refs": ["settings"]})).unwrap();
    assert_eq!(env.config_map_refs().unwrap()[0].name, "settings");

    let err = serde_json::from_value::<EnvironmentConfig>(json!({"env_vars": [["A"]]}));
    assert!(err.is_err());
}

#[test]
fn raise_behavior_rejects_unknown_fields() {
    let schema = EnvironmentSchema::new(SchemaOptions {
        unknown_field_behavior: UnknownFieldBehavior::Raise,
        ..Default::default()
    });
    let mut notices: Vec<DeprecationNotice> = Vec::new();
    let err = schema
        .load(json!({"max_retries": 1, "replicas": 2}), &mut notices)
        .unwrap_err();
    assert_eq!(err.field(), "replicas");
}
