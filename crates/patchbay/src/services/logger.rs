//! The built-in logger service
//!
//! Terminates the `log` endpoints of all services and forwards their entries
//! to the process-wide tracing subscriber. Its own `log` endpoint is
//! connected to itself.

use crate::endpoint::{ConnectedSpec, EndpointDefinition};
use crate::provider::ServiceProvider;
use crate::service::{default_endpoint_definitions, default_receive, Service, ServiceBase};
use async_trait::async_trait;
use patchbay_core::{LogEvent, Result, Severity};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// Log sink service
pub struct ServiceLogger {
    base: ServiceBase,
}

impl ServiceLogger {
    /// Name the logger registers under
    pub const NAME: &'static str = "logger";

    pub(crate) fn create(owner: Weak<ServiceProvider>) -> Arc<Self> {
        let config = json!({"name": Self::NAME});
        Arc::new(Self {
            base: ServiceBase::new(Self::NAME, &config, owner),
        })
    }

    /// Predefined endpoints; `log` is a self-connected receiver
    pub fn endpoint_definitions() -> BTreeMap<String, EndpointDefinition> {
        let mut endpoints = default_endpoint_definitions();
        endpoints.insert(
            "log".to_string(),
            EndpointDefinition {
                connected: Some(ConnectedSpec::One("self".to_string())),
                receive: Some("logEntry".to_string()),
                default: true,
                ..EndpointDefinition::default()
            },
        );
        endpoints
    }

    fn log_entry(&self, entry: Value) {
        match serde_json::from_value::<LogEvent>(entry.clone()) {
            Ok(event) => trace_log_event(&event),
            Err(_) => info!(raw = %entry, "log entry"),
        }
    }
}

#[async_trait]
impl Service for ServiceLogger {
    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn autostart(&self) -> bool {
        true
    }

    fn can_receive(&self, receiver: &str) -> bool {
        receiver == "logEntry" || matches!(receiver, "configure" | "execute")
    }

    async fn receive(&self, receiver: &str, message: Value) -> Result<Value> {
        if receiver == "logEntry" {
            self.log_entry(message);
            return Ok(Value::Null);
        }
        default_receive(self, receiver, message).await
    }
}

/// Emit a log event through the tracing subscriber
///
/// Used by the logger and as fallback while a service's `log` endpoint is
/// not wired yet.
pub(crate) fn trace_log_event(event: &LogEvent) {
    let fields = if event.fields.is_empty() {
        String::new()
    } else {
        Value::Object(event.fields.clone()).to_string()
    };
    match event.severity {
        Severity::Trace => trace!(service = %event.service, %fields, "{}", event.message),
        Severity::Debug => debug!(service = %event.service, %fields, "{}", event.message),
        Severity::Info => info!(service = %event.service, %fields, "{}", event.message),
        Severity::Warn => warn!(service = %event.service, %fields, "{}", event.message),
        Severity::Error => error!(service = %event.service, %fields, "{}", event.message),
    }
}
