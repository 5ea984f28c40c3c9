//! Service lifecycle and configuration behavior

use crate::support::{test_provider, TestServiceFactory};
use patchbay::{JsonOptions, Service, ServiceProvider, ServiceState};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn fresh_service_is_stopped_with_default_endpoints() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    assert_eq!(service.base().state(), ServiceState::Stopped);
    for name in ["log", "config", "command"] {
        assert!(
            service.base().endpoint(name).is_some(),
            "missing endpoint {name}"
        );
    }

    let log = service.base().endpoint("log").unwrap();
    assert!(log.has_resolved_connections(), "log not wired to logger");
}

#[tokio::test]
async fn start_stop_cycle() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    service.start().await.unwrap();
    assert_eq!(service.base().state(), ServiceState::Running);
    assert!(service.base().endpoint("log").unwrap().is_open());

    service.stop().await.unwrap();
    assert_eq!(service.base().state(), ServiceState::Stopped);
    assert!(!service.base().endpoint("log").unwrap().is_open());
}

#[tokio::test]
async fn wrong_state_transitions_error() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    let err = service.stop().await.unwrap_err();
    assert!(err.to_string().starts_with("Can't stop"), "{err}");

    service.start().await.unwrap();
    let err = service.start().await.unwrap_err();
    assert!(err.to_string().starts_with("Can't start"), "{err}");
    assert_eq!(service.base().state(), ServiceState::Running);
}

#[tokio::test]
async fn failing_start_hook_rejects_into_failed() {
    let provider = ServiceProvider::new(json!({})).await.unwrap();
    provider.register_service_factory(Arc::new(TestServiceFactory {
        fail_start: true,
        ..TestServiceFactory::default()
    }));
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    let err = service.start().await.unwrap_err();
    assert!(err.to_string().contains("aborted"), "{err}");
    assert_eq!(service.base().state(), ServiceState::Failed);

    // A failed service can still be stopped.
    service.stop().await.unwrap();
    assert_eq!(service.base().state(), ServiceState::Stopped);
}

#[tokio::test]
async fn slow_start_hook_times_out() {
    let provider = ServiceProvider::new(json!({})).await.unwrap();
    provider.register_service_factory(Arc::new(TestServiceFactory {
        start_delay: Duration::from_millis(200),
        ..TestServiceFactory::default()
    }));
    let service = provider
        .declare_service(json!({
            "name": "t1",
            "type": "test",
            "timeout": {"start": 0.05},
        }))
        .await
        .unwrap();

    let err = service.start().await.unwrap_err();
    assert!(err.to_string().contains("timeout"), "{err}");
    assert_eq!(service.base().state(), ServiceState::Failed);
}

#[tokio::test]
async fn needs_restart_attribute_triggers_restart() {
    let factory = Arc::new(TestServiceFactory::default());
    let starts = factory.starts.clone();
    let provider = ServiceProvider::new(json!({})).await.unwrap();
    provider.register_service_factory(factory);

    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();
    service.start().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    service.configure(json!({"key3": "changed"})).await.unwrap();
    assert_eq!(service.base().state(), ServiceState::Running);
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    // Attributes without the restart flag reconfigure in place.
    service.configure(json!({"key1": "changed"})).await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert_eq!(service.base().attribute_value("key1"), Some(json!("changed")));
}

#[tokio::test]
async fn private_attributes_stay_out_of_snapshots() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({
            "name": "t1",
            "type": "test",
            "key1": "visible",
            "secret": "s3cr3t",
        }))
        .await
        .unwrap();

    let snapshot = service.to_json();
    let text = snapshot.to_string();
    assert!(text.contains("visible"));
    assert!(!text.contains("s3cr3t"));
}

#[tokio::test]
async fn default_endpoints_filtered_from_snapshots() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({
            "name": "t1",
            "type": "test",
            "endpoints": {"out": "service(logger).log"},
        }))
        .await
        .unwrap();

    let options = JsonOptions {
        include_defaults: false,
        ..JsonOptions::full()
    };
    let endpoints = service.to_json_with_options(options);
    let endpoints = endpoints["endpoints"].as_object().unwrap();
    assert!(endpoints.contains_key("out"), "configured endpoint missing");
    for name in ["log", "config", "command"] {
        assert!(!endpoints.contains_key(name), "{name} should be filtered");
    }

    // The full snapshot still carries the predefined endpoints.
    let full = service.to_json();
    let full = full["endpoints"].as_object().unwrap();
    for name in ["out", "log", "config", "command"] {
        assert!(full.contains_key(name), "{name} missing from full snapshot");
    }
}

#[tokio::test]
async fn json_snapshot_is_stable() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test", "key1": "v"}))
        .await
        .unwrap();

    let first = service.to_json();
    assert_eq!(first["name"], json!("t1"));
    assert_eq!(first["type"], json!("test"));
    assert_eq!(first["state"], json!("stopped"));
    assert_eq!(first, service.to_json());
}
