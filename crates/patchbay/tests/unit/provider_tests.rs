//! Provider lifecycle, admin surface and runtime events

use crate::support::{test_provider, TestServiceFactory};
use patchbay::{RuntimeEvent, Service, ServiceProvider, ServiceState};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn provider_start_starts_autostart_services_only() {
    let provider = test_provider().await;
    provider
        .declare_service(json!({"name": "t1", "type": "test", "autostart": true}))
        .await
        .unwrap();
    provider
        .declare_service(json!({"name": "t2", "type": "test"}))
        .await
        .unwrap();

    provider.start().await.unwrap();
    assert_eq!(provider.base().state(), ServiceState::Running);
    assert_eq!(
        provider.get_service("t1").unwrap().base().state(),
        ServiceState::Running
    );
    assert_eq!(
        provider.get_service("t2").unwrap().base().state(),
        ServiceState::Stopped
    );
    assert_eq!(
        provider.get_service("logger").unwrap().base().state(),
        ServiceState::Running
    );
}

#[tokio::test]
async fn provider_stop_stops_every_service_once() {
    let factory = Arc::new(TestServiceFactory::default());
    let stops = factory.stops.clone();
    let provider = ServiceProvider::new(json!({})).await.unwrap();
    provider.register_service_factory(factory);

    for name in ["t1", "t2", "t3"] {
        provider
            .declare_service(json!({"name": name, "type": "test", "autostart": true}))
            .await
            .unwrap();
    }
    provider.start().await.unwrap();

    provider.stop().await.unwrap();
    assert_eq!(provider.base().state(), ServiceState::Stopped);
    assert_eq!(stops.load(Ordering::SeqCst), 3);
    for name in ["t1", "t2", "t3", "logger", "config"] {
        assert_eq!(
            provider.get_service(name).unwrap().base().state(),
            ServiceState::Stopped,
            "{name} not stopped"
        );
    }
}

#[tokio::test]
async fn admin_command_surface() {
    let provider = test_provider().await;
    provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    let listing = provider.execute(json!({"action": "list"})).await.unwrap();
    let names: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    for expected in ["t1", "logger", "config"] {
        assert!(names.contains(&expected), "{expected} missing from listing");
    }

    let snapshot = provider
        .execute(json!({"action": "get", "service": "t1"}))
        .await
        .unwrap();
    assert_eq!(snapshot["type"], json!("test"));

    provider
        .execute(json!({"action": "start", "service": "t1"}))
        .await
        .unwrap();
    assert_eq!(
        provider.get_service("t1").unwrap().base().state(),
        ServiceState::Running
    );

    let results = provider
        .execute(json!([
            {"action": "restart", "service": "t1"},
            {"action": "stop", "service": "t1"},
        ]))
        .await
        .unwrap();
    assert_eq!(results.as_array().unwrap().len(), 2);
    assert_eq!(
        provider.get_service("t1").unwrap().base().state(),
        ServiceState::Stopped
    );

    let err = provider
        .execute(json!({"action": "get", "service": "nope"}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown service: nope");

    let err = provider
        .execute(json!({"action": "frobnicate", "service": "t1"}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown command: frobnicate");
}

#[tokio::test]
async fn state_changes_are_broadcast() {
    let provider = test_provider().await;
    let service = provider
        .declare_service(json!({"name": "t1", "type": "test"}))
        .await
        .unwrap();

    let mut events = provider.subscribe();
    service.start().await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        match events.recv().await.unwrap() {
            RuntimeEvent::ServiceStateChanged { service, from, to } if service == "t1" => {
                seen.push((from, to));
            }
            _ => {}
        }
    }
    assert_eq!(
        seen,
        vec![
            (ServiceState::Stopped, ServiceState::Starting),
            (ServiceState::Starting, ServiceState::Running),
        ]
    );
}

#[tokio::test]
async fn unregistering_a_service_stops_it_first() {
    let provider = test_provider().await;
    provider
        .declare_service(json!({"name": "t1", "type": "test", "autostart": true}))
        .await
        .unwrap();
    provider.start().await.unwrap();

    provider.unregister_service("t1").await.unwrap();
    assert!(provider.get_service("t1").is_none());

    let err = provider.unregister_service("t1").await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown service: t1");
}
