//! Shared fixtures for the suite

use async_trait::async_trait;
use patchbay::{
    base_configuration_attributes, AttributeDefinition, Error, Result, Service, ServiceBase,
    ServiceFactory, ServiceProvider,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Service type used throughout the suite
///
/// Start and stop counts are shared with the creating factory so tests can
/// observe lifecycle hooks without downcasting.
pub struct TestService {
    base: ServiceBase,
    start_delay: Duration,
    fail_start: bool,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl Service for TestService {
    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn configuration_attributes(&self) -> Vec<AttributeDefinition> {
        let mut attributes = base_configuration_attributes();
        attributes.push(AttributeDefinition::new("key1", "a plain value"));
        attributes.push(AttributeDefinition::new("key2", "another plain value"));
        attributes
            .push(AttributeDefinition::new("key3", "a value forcing a restart").needs_restart());
        attributes.push(AttributeDefinition::new("secret", "a hidden value").private());
        attributes
    }

    async fn on_start(&self) -> Result<()> {
        if self.fail_start {
            return Err(Error::internal("start denied"));
        }
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.base.open_endpoint_connections();
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.base.close_endpoint_connections();
        Ok(())
    }
}

/// Factory for [`TestService`] under the type name `test`
#[derive(Default)]
pub struct TestServiceFactory {
    pub start_delay: Duration,
    pub fail_start: bool,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

#[async_trait]
impl ServiceFactory for TestServiceFactory {
    fn type_name(&self) -> &str {
        "test"
    }

    async fn create(
        &self,
        config: Value,
        owner: Weak<ServiceProvider>,
    ) -> Result<Arc<dyn Service>> {
        Ok(Arc::new(TestService {
            base: ServiceBase::new("test", &config, owner),
            start_delay: self.start_delay,
            fail_start: self.fail_start,
            starts: self.starts.clone(),
            stops: self.stops.clone(),
        }))
    }
}

/// A fresh provider with the `test` factory registered
pub async fn test_provider() -> Arc<ServiceProvider> {
    let provider = ServiceProvider::new(json!({})).await.expect("provider");
    provider.register_service_factory(Arc::new(TestServiceFactory::default()));
    provider
}
