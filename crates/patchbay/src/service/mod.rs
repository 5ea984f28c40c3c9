//! Services
//!
//! A service is a state-machine-driven unit of work with configuration
//! attributes, endpoints and start/stop/restart lifecycle. The capability
//! split is explicit: `ServiceBase` carries the shared state every service
//! embeds, the [`Service`] trait carries behavior with overridable defaults,
//! and the transition driver in [`transition`] owns the state machine rules.
//!
//! All services have at least three endpoints:
//! - `log` _out_: log events, wired to `service(logger).log`
//! - `config` _in_: configuration requests
//! - `command` _in_: administrative actions

mod attributes;
mod factory;
pub(crate) mod transition;

pub use attributes::{
    base_configuration_attributes, insert_at_path, parse_duration_value, value_at_path,
    AttributeDefinition,
};
pub use factory::{default_endpoint_definitions, ServiceFactory};

use crate::endpoint::Endpoint;
use crate::provider::ServiceProvider;
use async_trait::async_trait;
use patchbay_core::{
    EndpointExpression, Error, JsonOptions, LogEvent, Result, ServiceState, Severity, Transition,
    TransitionAction,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, trace};

/// Per-action transition timeouts
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Start transition timeout
    pub start: Duration,
    /// Stop transition timeout
    pub stop: Duration,
    /// Restart transition timeout
    pub restart: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let timeout = patchbay_core::state::DEFAULT_TRANSITION_TIMEOUT;
        Self {
            start: timeout,
            stop: timeout,
            restart: timeout,
        }
    }
}

/// Shared state embedded by every service implementation
///
/// Identity (`name`, `type_name`, `owner`) is fixed at construction; the
/// rest is interior-mutable because services are shared as `Arc<dyn Service>`.
pub struct ServiceBase {
    name: String,
    type_name: String,
    owner: Weak<ServiceProvider>,
    autostart: bool,
    state: RwLock<ServiceState>,
    log_level: RwLock<Severity>,
    description: RwLock<Option<String>>,
    timeouts: RwLock<Timeouts>,
    values: RwLock<serde_json::Map<String, Value>>,
    endpoints: RwLock<BTreeMap<String, Arc<Endpoint>>>,
    transition_settled: Notify,
}

impl ServiceBase {
    /// Create the base from a service config
    ///
    /// `name` defaults to the type name; `autostart` defaults to false.
    pub fn new(
        type_name: impl Into<String>,
        config: &Value,
        owner: Weak<ServiceProvider>,
    ) -> Self {
        let type_name = type_name.into();
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| type_name.clone(), str::to_string);
        let autostart = config
            .get("autostart")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            name,
            type_name,
            owner,
            autostart,
            state: RwLock::new(ServiceState::Stopped),
            log_level: RwLock::new(Severity::Info),
            description: RwLock::new(None),
            timeouts: RwLock::new(Timeouts::default()),
            values: RwLock::new(serde_json::Map::new()),
            endpoints: RwLock::new(BTreeMap::new()),
            transition_settled: Notify::new(),
        }
    }

    /// Service name, unique within the owning provider
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Factory type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The owning provider, while it is still alive
    pub fn owner(&self) -> Option<Arc<ServiceProvider>> {
        self.owner.upgrade()
    }

    /// The owning provider as a weak handle
    pub fn owner_weak(&self) -> Weak<ServiceProvider> {
        self.owner.clone()
    }

    /// Should the service start when its provider starts
    pub fn autostart(&self) -> bool {
        self.autostart
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        *self.state.read().expect("state lock")
    }

    pub(crate) fn set_state(&self, state: ServiceState) -> ServiceState {
        let mut current = self.state.write().expect("state lock");
        std::mem::replace(&mut *current, state)
    }

    pub(crate) fn transition_settled(&self) -> &Notify {
        &self.transition_settled
    }

    pub(crate) fn notify_settled(&self) {
        self.transition_settled.notify_waiters();
    }

    /// Current log level threshold
    pub fn log_level(&self) -> Severity {
        *self.log_level.read().expect("log level lock")
    }

    /// Timeout for a transition action
    pub fn timeout_for(&self, action: TransitionAction) -> Duration {
        let timeouts = self.timeouts.read().expect("timeouts lock");
        match action {
            TransitionAction::Start => timeouts.start,
            TransitionAction::Stop => timeouts.stop,
            TransitionAction::Restart => timeouts.restart,
        }
    }

    /// Look up an endpoint by name
    pub fn endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.read().expect("endpoints lock").get(name).cloned()
    }

    /// All endpoints in name order
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .read()
            .expect("endpoints lock")
            .values()
            .cloned()
            .collect()
    }

    /// All _out_ endpoints
    pub fn out_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints().into_iter().filter(|e| e.is_out()).collect()
    }

    /// All _in_ endpoints
    pub fn in_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints().into_iter().filter(|e| e.is_in()).collect()
    }

    /// Register an endpoint under its name
    pub fn add_endpoint(&self, endpoint: Arc<Endpoint>) {
        self.endpoints
            .write()
            .expect("endpoints lock")
            .insert(endpoint.name().to_string(), endpoint);
    }

    /// Remove an endpoint
    pub fn remove_endpoint(&self, name: &str) {
        self.endpoints.write().expect("endpoints lock").remove(name);
    }

    /// Open all endpoint connections; safe to call more than once
    pub fn open_endpoint_connections(&self) {
        for endpoint in self.endpoints() {
            endpoint.open_connections();
        }
    }

    /// Close all endpoint connections; safe to call more than once
    pub fn close_endpoint_connections(&self) {
        for endpoint in self.endpoints() {
            endpoint.close_connections();
        }
    }

    /// Apply configuration values according to a descriptor table
    ///
    /// Unknown keys in `config` are ignored. Returns the descriptors whose
    /// value was modified; defaults are applied only when `apply_defaults`
    /// is set (at construction) and do not count as modifications.
    pub fn apply_configuration(
        &self,
        definitions: &[AttributeDefinition],
        config: &Value,
        apply_defaults: bool,
    ) -> Result<Vec<AttributeDefinition>> {
        let mut modified = Vec::new();
        for definition in definitions {
            match value_at_path(config, definition.path) {
                Some(value) => {
                    let shown = if definition.private {
                        json!("***")
                    } else {
                        value.clone()
                    };
                    trace!(
                        service = %self.name,
                        attribute = definition.path,
                        value = %shown,
                        "config"
                    );
                    self.set_attribute(definition.path, value)?;
                    modified.push(definition.clone());
                }
                None => {
                    if apply_defaults {
                        if let Some(default) = &definition.default {
                            self.set_attribute(definition.path, default)?;
                        }
                    }
                }
            }
        }
        Ok(modified)
    }

    fn set_attribute(&self, path: &str, value: &Value) -> Result<()> {
        match path {
            "description" => {
                let text = value.as_str().ok_or_else(|| {
                    Error::configuration(format!("description must be a string, got {value}"))
                })?;
                *self.description.write().expect("description lock") = Some(text.to_string());
            }
            "logLevel" => {
                let severity: Severity = value
                    .as_str()
                    .ok_or_else(|| {
                        Error::configuration(format!("logLevel must be a string, got {value}"))
                    })?
                    .parse()?;
                *self.log_level.write().expect("log level lock") = severity;
            }
            "timeout.start" => {
                self.timeouts.write().expect("timeouts lock").start = parse_duration_value(value)?;
            }
            "timeout.stop" => {
                self.timeouts.write().expect("timeouts lock").stop = parse_duration_value(value)?;
            }
            "timeout.restart" => {
                self.timeouts.write().expect("timeouts lock").restart =
                    parse_duration_value(value)?;
            }
            _ => {
                self.values
                    .write()
                    .expect("values lock")
                    .insert(path.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Current value of a configuration attribute
    pub fn attribute_value(&self, path: &str) -> Option<Value> {
        let timeouts = || self.timeouts.read().expect("timeouts lock");
        match path {
            "description" => self
                .description
                .read()
                .expect("description lock")
                .clone()
                .map(Value::String),
            "logLevel" => Some(Value::String(self.log_level().to_string())),
            "timeout.start" => Some(Value::from(timeouts().start.as_secs_f64())),
            "timeout.stop" => Some(Value::from(timeouts().stop.as_secs_f64())),
            "timeout.restart" => Some(Value::from(timeouts().restart.as_secs_f64())),
            _ => self.values.read().expect("values lock").get(path).cloned(),
        }
    }
}

/// The service behavior seam
///
/// Everything except `base()` has a default implementation; service types
/// embed a [`ServiceBase`] and override only the hooks and receivers they
/// care about.
#[async_trait]
pub trait Service: Send + Sync {
    /// The embedded shared state
    fn base(&self) -> &ServiceBase;

    /// Schema of the accepted configuration keys
    fn configuration_attributes(&self) -> Vec<AttributeDefinition> {
        base_configuration_attributes()
    }

    /// Receivers endpoint definitions may bind to
    fn can_receive(&self, receiver: &str) -> bool {
        matches!(receiver, "configure" | "execute")
    }

    /// Should the service start when its provider starts
    fn autostart(&self) -> bool {
        self.base().autostart()
    }

    /// Human readable state message, `name(state=running)`
    fn describe(&self) -> String {
        format!("{}(state={})", self.base().name(), self.base().state())
    }

    /// Dispatch an inbound endpoint message to a receiver
    async fn receive(&self, receiver: &str, message: Value) -> Result<Value> {
        default_receive(self, receiver, message).await
    }

    /// Handle an administrative command; the default answers name and state
    async fn execute(&self, _command: Value) -> Result<Value> {
        Ok(json!({
            "name": self.base().name(),
            "state": self.base().state(),
        }))
    }

    /// Use new configuration
    ///
    /// Applies recognized attributes and restarts the service when a
    /// modified attribute is flagged `needs_restart` and the service is
    /// running. Unrecognized keys are ignored.
    async fn configure(&self, config: Value) -> Result<()> {
        let modified = self.base().apply_configuration(
            &self.configuration_attributes(),
            &config,
            false,
        )?;
        if modified.iter().any(|a| a.needs_restart) {
            self.restart_if_running().await?;
        }
        Ok(())
    }

    /// Start hook; the default opens all endpoint connections
    async fn on_start(&self) -> Result<()> {
        self.base().open_endpoint_connections();
        Ok(())
    }

    /// Stop hook; the default closes all endpoint connections
    async fn on_stop(&self) -> Result<()> {
        self.base().close_endpoint_connections();
        Ok(())
    }

    /// Restart hook; the default stops and starts again
    async fn on_restart(&self) -> Result<()> {
        self.on_stop().await?;
        self.on_start().await
    }

    /// Drive the start transition
    async fn start(&self) -> Result<()> {
        transition::run(self, TransitionAction::Start).await
    }

    /// Drive the stop transition
    async fn stop(&self) -> Result<()> {
        transition::run(self, TransitionAction::Stop).await
    }

    /// Drive the restart transition
    async fn restart(&self) -> Result<()> {
        transition::run(self, TransitionAction::Restart).await
    }

    /// Restart when running, otherwise do nothing
    async fn restart_if_running(&self) -> Result<()> {
        if self.base().state() == ServiceState::Running {
            self.restart().await
        } else {
            Ok(())
        }
    }

    /// Called for every committed state transition
    async fn state_changed(&self, from: ServiceState, to: ServiceState) {
        if let Some(owner) = self.base().owner() {
            owner.service_state_changed(self.base().name(), from, to);
        }
        self.log(
            Severity::Trace,
            json!({
                "message": format!("{}: transitioned from {from} to {to}", self.base().name()),
                "from": from,
                "state": to,
            }),
        )
        .await;
    }

    /// Called when a transition hook fails or times out
    ///
    /// Overridable so rejections stay observable; the default logs the
    /// rejected transition and target state and builds the error the caller
    /// sees.
    async fn state_transition_rejection(&self, transition: &Transition, reason: &str) -> Error {
        error!(
            service = %self.base().name(),
            action = %transition.action,
            target = %transition.rejected,
            reason = %reason,
            "transition aborted"
        );
        self.log(
            Severity::Error,
            json!({
                "message": format!("{}: transition aborted", self.describe()),
                "action": transition.action,
                "state": transition.rejected,
                "reason": reason,
            }),
        )
        .await;
        Error::TransitionRejected {
            action: transition.action.to_string(),
            service: self.base().name().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Send a structured log event over the `log` endpoint
    ///
    /// Entries below the service's log level are dropped. Before the log
    /// endpoint is wired the entry falls back to the process-wide tracing
    /// subscriber so nothing is lost.
    async fn log(&self, severity: Severity, payload: Value) {
        if !severity.passes(self.base().log_level()) {
            return;
        }
        let event = LogEvent::new(severity, self.base().name(), payload);
        match self.base().endpoint("log") {
            Some(endpoint) if endpoint.has_resolved_connections() => {
                if let Ok(value) = serde_json::to_value(&event) {
                    let _ = endpoint.send(value).await;
                }
            }
            _ => crate::services::trace_log_event(&event),
        }
    }

    /// Find an endpoint for an expression
    ///
    /// A bare name is a sibling endpoint, `service(<name>).<rest>` crosses
    /// to another service through the owner, `self` resolves to the endpoint
    /// the expression is evaluated `from`.
    fn endpoint_for_expression(
        &self,
        expression: &str,
        from: Option<&Arc<Endpoint>>,
    ) -> Option<Arc<Endpoint>> {
        if let Some(endpoint) = self.base().endpoint(expression) {
            return Some(endpoint);
        }

        match EndpointExpression::parse(expression) {
            EndpointExpression::Foreign { service, rest } => self
                .base()
                .owner()?
                .get_service(&service)?
                .endpoint_for_expression(&rest, None),
            EndpointExpression::SelfRef => from.cloned(),
            EndpointExpression::Local(_) => None,
        }
    }

    /// JSON snapshot, the wire format consumed by external admin tooling
    fn to_json_with_options(&self, options: JsonOptions) -> Value {
        let mut json = Value::Object(serde_json::Map::new());
        {
            let map = json.as_object_mut().expect("object");
            map.insert("type".into(), Value::String(self.base().type_name().into()));
            if options.include_name {
                map.insert("name".into(), Value::String(self.base().name().into()));
            }
            if options.include_runtime_info {
                map.insert(
                    "state".into(),
                    serde_json::to_value(self.base().state()).expect("state"),
                );
                map.insert(
                    "logLevel".into(),
                    Value::String(self.base().log_level().to_string()),
                );
            }
        }

        if options.include_config {
            for definition in self.configuration_attributes() {
                if definition.private && !options.include_private {
                    continue;
                }
                if let Some(value) = self.base().attribute_value(definition.path) {
                    json = insert_at_path(json, definition.path, value);
                }
            }
        }

        let mut endpoints = serde_json::Map::new();
        for endpoint in self.base().endpoints() {
            if endpoint.is_default() && !options.include_defaults {
                continue;
            }
            endpoints.insert(
                endpoint.name().to_string(),
                endpoint.to_json_with_options(options),
            );
        }
        if !endpoints.is_empty() {
            json.as_object_mut()
                .expect("object")
                .insert("endpoints".into(), Value::Object(endpoints));
        }

        json
    }

    /// JSON snapshot with everything except private attributes
    fn to_json(&self) -> Value {
        self.to_json_with_options(JsonOptions::full())
    }
}

/// Default receiver dispatch: `configure` and `execute`
///
/// Service types overriding [`Service::receive`] delegate unknown receivers
/// here to keep the built-in bindings working.
pub async fn default_receive<S: Service + ?Sized>(
    service: &S,
    receiver: &str,
    message: Value,
) -> Result<Value> {
    match receiver {
        "configure" => {
            service.configure(message).await?;
            Ok(Value::Null)
        }
        "execute" => service.execute(message).await,
        other => Err(Error::UnknownReceiver {
            service: service.base().name().to_string(),
            receiver: other.to_string(),
        }),
    }
}
