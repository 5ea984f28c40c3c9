//! Service factories
//!
//! A factory is the constructible side of a service type: it names the type,
//! declares its predefined endpoints and configuration schema, and builds
//! instances. Factories register on the provider; declarations referencing a
//! type registered later wait for the matching registration event.

use super::{base_configuration_attributes, AttributeDefinition, Service};
use crate::endpoint::{ConnectedSpec, EndpointDefinition};
use crate::provider::ServiceProvider;
use async_trait::async_trait;
use patchbay_core::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Constructs services of one type
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    /// Type name service configurations reference via `type`
    fn type_name(&self) -> &str;

    /// Human readable description of the service type
    fn description(&self) -> &str {
        "no description"
    }

    /// Predefined endpoints, merged under per-instance config endpoints
    fn endpoints(&self) -> BTreeMap<String, EndpointDefinition> {
        default_endpoint_definitions()
    }

    /// Configuration schema of the service type
    fn configuration_attributes(&self) -> Vec<AttributeDefinition> {
        base_configuration_attributes()
    }

    /// Build a service instance
    ///
    /// The config has preserved configuration already merged in; endpoint
    /// wiring happens afterwards through the initialization context.
    async fn create(&self, config: Value, owner: Weak<ServiceProvider>)
        -> Result<Arc<dyn Service>>;
}

/// The endpoints predefined on every service
///
/// - `log` _out_, wired to `service(logger).log`
/// - `config` _in_, receive → `configure`
/// - `command` _in_, receive → `execute`
pub fn default_endpoint_definitions() -> BTreeMap<String, EndpointDefinition> {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        "log".to_string(),
        EndpointDefinition {
            connected: Some(ConnectedSpec::One("service(logger).log".to_string())),
            ..EndpointDefinition::default()
        },
    );
    endpoints.insert(
        "config".to_string(),
        EndpointDefinition {
            in_: true,
            receive: Some("configure".to_string()),
            ..EndpointDefinition::default()
        },
    );
    endpoints.insert(
        "command".to_string(),
        EndpointDefinition {
            in_: true,
            receive: Some("execute".to_string()),
            ..EndpointDefinition::default()
        },
    );
    endpoints
}
