//! Declaration-order independence and the shared declaration protocol

use crate::support::{test_provider, TestServiceFactory};
use patchbay::{ProviderOptions, Service, ServiceProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn cross_references_connect_in_either_order() {
    let provider = test_provider().await;
    let declared = provider
        .declare_services(json!({
            "t2": {"type": "test", "endpoints": {"out": "service(t1).in"}},
            "t1": {"type": "test", "endpoints": {"in": {"in": true, "receive": "configure"}}},
        }))
        .await
        .unwrap();

    assert_eq!(declared.len(), 2);
    let out = declared["t2"].base().endpoint("out").unwrap();
    assert!(out.has_resolved_connections());
    assert_eq!(provider.context().outstanding_connection_count(), 0);
}

#[tokio::test]
async fn concurrent_declarations_construct_once() {
    let provider = test_provider().await;
    let (a, b) = tokio::join!(
        provider.declare_service(json!({"name": "t1", "type": "test"})),
        provider.declare_service(json!({"name": "t1", "type": "test"})),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert!(Arc::ptr_eq(&a, &b), "expected one shared instance");
}

#[tokio::test]
async fn late_factory_registration_completes_declaration() {
    let provider = ServiceProvider::new(json!({})).await.unwrap();

    let declaring = {
        let provider = provider.clone();
        tokio::spawn(async move {
            provider
                .declare_service(json!({"name": "s1", "type": "test"}))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(provider.get_service("s1").is_none());
    provider.register_service_factory(Arc::new(TestServiceFactory::default()));

    let service = declaring.await.unwrap().unwrap();
    assert_eq!(service.base().type_name(), "test");
    assert!(provider.get_service("s1").is_some());
}

#[tokio::test]
async fn missing_factory_fails_fast_without_waiting() {
    let provider = ServiceProvider::with_options(
        json!({}),
        ProviderOptions {
            wait_for_factories: false,
            logger_factory: None,
        },
    )
    .await
    .unwrap();

    let err = provider
        .declare_service(json!({"name": "s1", "type": "unheard-of"}))
        .await
        .err()
        .expect("declaration should fail without a factory");
    assert_eq!(err.to_string(), "No factory for unheard-of");
}

#[tokio::test]
async fn redeclaring_reconfigures_the_existing_instance() {
    let provider = test_provider().await;
    let first = provider
        .declare_service(json!({"name": "t1", "type": "test", "key1": "a"}))
        .await
        .unwrap();
    let second = provider
        .declare_service(json!({"name": "t1", "type": "test", "key1": "b"}))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.base().attribute_value("key1"), Some(json!("b")));
}

#[tokio::test]
async fn failing_declarations_are_dropped_from_the_batch() {
    let provider = test_provider().await;
    let declared = provider
        .declare_services(json!({
            "good": {"type": "test"},
            "bad": {"type": "test", "endpoints": {"broken": {"in": true, "receive": "nope"}}},
        }))
        .await
        .unwrap();

    assert!(declared.contains_key("good"));
    assert!(!declared.contains_key("bad"));
    assert!(provider.get_service("bad").is_none());
}
