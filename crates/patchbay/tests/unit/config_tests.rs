//! Config service behavior: preservation, merging and routing

use crate::support::test_provider;
use patchbay::Service;
use serde_json::json;

#[tokio::test]
async fn preserved_configs_accumulate_by_merge() {
    let provider = test_provider().await;
    let config = provider.config_service().unwrap();

    config.configure(json!({"a": {"b": {"c": 7}}})).await.unwrap();
    config.configure(json!({"a": {"key3": 3}})).await.unwrap();
    config
        .configure_value("a.b.c2", json!({"key4": "value4"}))
        .await
        .unwrap();

    assert_eq!(
        config.preserved_config("a").unwrap(),
        json!({"b": {"c": 7, "c2": {"key4": "value4"}}, "key3": 3})
    );
}

#[tokio::test]
async fn declared_service_picks_up_preserved_config() {
    let provider = test_provider().await;
    let config = provider.config_service().unwrap();
    config
        .configure(json!({"t1": {"key1": "preset"}}))
        .await
        .unwrap();

    let service = provider
        .declare_service(json!({"name": "t1", "type": "test", "key1": "declared"}))
        .await
        .unwrap();

    // Preserved values win over the declaration, then the entry is consumed.
    assert_eq!(service.base().attribute_value("key1"), Some(json!("preset")));
    assert!(config.preserved_config("t1").is_none());
}

#[tokio::test]
async fn entries_for_registered_services_configure_them_directly() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();
    let config = provider.config_service().unwrap();

    config
        .configure(json!([{"name": "t1", "key2": "updated"}]))
        .await
        .unwrap();
    assert_eq!(service.base().attribute_value("key2"), Some(json!("updated")));
    assert!(config.preserved_config("t1").is_none());
}

#[tokio::test]
async fn config_service_starts_itself_lazily() {
    let provider = test_provider().await;
    let config = provider.config_service().unwrap();
    assert_ne!(config.base().state(), patchbay::ServiceState::Running);

    config.config_for("later", json!({"x": 1})).await.unwrap();
    assert_eq!(config.base().state(), patchbay::ServiceState::Running);
    assert_eq!(config.preserved_config("later"), Some(json!({"x": 1})));
}
