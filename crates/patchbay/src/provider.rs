//! Service provider
//!
//! The provider is itself a service. It owns the service registry, the
//! factory registries and the runtime event channel, and exposes the
//! administrative command surface. Starting the provider starts all
//! registered autostart services; stopping it stops every registered
//! service exactly once.

use crate::context::InitializationContext;
use crate::interceptor::{Interceptor, InterceptorFactory};
use crate::service::{default_endpoint_definitions, Service, ServiceBase, ServiceFactory};
use crate::services::{ServiceConfig, ServiceLogger};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{join_all, try_join_all};
use patchbay_core::state::transition_for;
use patchbay_core::{
    Error, EventBus, JsonOptions, Result, RuntimeEvent, ServiceState, TransitionAction,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::broadcast;
use tracing::{error, warn};

/// Tunables of a provider, beyond its service config
pub struct ProviderOptions {
    /// Keep declarations pending until a factory for their type registers
    pub wait_for_factories: bool,
    /// Replacement factory for the built-in logger service
    pub logger_factory: Option<Arc<dyn ServiceFactory>>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            wait_for_factories: true,
            logger_factory: None,
        }
    }
}

/// Registry and lifecycle root for a set of services
pub struct ServiceProvider {
    base: ServiceBase,
    services: DashMap<String, Arc<dyn Service>>,
    service_factories: DashMap<String, Arc<dyn ServiceFactory>>,
    interceptor_factories: DashMap<String, Arc<dyn InterceptorFactory>>,
    events: EventBus,
    context: Arc<InitializationContext>,
    config_service: OnceLock<Arc<ServiceConfig>>,
}

impl ServiceProvider {
    /// Create a provider with default options
    ///
    /// `config` is either the provider's own service config or an array whose
    /// first element configures the provider; all of it is fed to the config
    /// service afterwards.
    pub async fn new(config: Value) -> Result<Arc<Self>> {
        Self::with_options(config, ProviderOptions::default()).await
    }

    /// Create a provider
    ///
    /// The built-in `logger` and `config` services are registered before
    /// anything else so the predefined endpoints of every later service
    /// resolve immediately.
    pub async fn with_options(config: Value, options: ProviderOptions) -> Result<Arc<Self>> {
        let initial = match &config {
            Value::Array(items) => items.first().cloned().unwrap_or_else(|| json!({})),
            other => other.clone(),
        };

        let context = Arc::new(InitializationContext::new(options.wait_for_factories));
        let provider = Arc::new_cyclic(|weak: &Weak<ServiceProvider>| Self {
            base: ServiceBase::new("provider", &initial, weak.clone()),
            services: DashMap::new(),
            service_factories: DashMap::new(),
            interceptor_factories: DashMap::new(),
            events: EventBus::new(),
            context: context.clone(),
            config_service: OnceLock::new(),
        });
        context.set_provider(&provider);
        provider.base.apply_configuration(
            &provider.configuration_attributes(),
            &initial,
            true,
        )?;

        let owner = Arc::downgrade(&provider);
        let logger: Arc<dyn Service> = match &options.logger_factory {
            Some(factory) => {
                let logger_config = json!({"name": ServiceLogger::NAME, "autostart": true});
                factory.create(logger_config, owner.clone()).await?
            }
            None => ServiceLogger::create(owner.clone()),
        };
        let logger_endpoints = match &options.logger_factory {
            Some(factory) => factory.endpoints(),
            None => ServiceLogger::endpoint_definitions(),
        };
        context.wire_endpoints(&logger, logger_endpoints, &json!({}))?;
        provider.register_service(logger);

        let config_service = ServiceConfig::create(owner);
        let config_dyn: Arc<dyn Service> = config_service.clone();
        context.wire_endpoints(&config_dyn, default_endpoint_definitions(), &json!({}))?;
        provider.register_service(config_dyn);
        provider
            .config_service
            .set(config_service.clone())
            .map_err(|_| Error::internal("config service registered twice"))?;

        let provider_dyn: Arc<dyn Service> = provider.clone();
        context.wire_endpoints(&provider_dyn, default_endpoint_definitions(), &initial)?;
        provider.register_service(provider_dyn);

        context.resolve_outstanding_endpoint_connections();

        config_service.configure(config).await?;

        Ok(provider)
    }

    /// The initialization context tracking outstanding work
    pub fn context(&self) -> &Arc<InitializationContext> {
        &self.context
    }

    /// The built-in config service
    pub fn config_service(&self) -> Option<Arc<ServiceConfig>> {
        self.config_service.get().cloned()
    }

    /// Subscribe to runtime events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// Look up a registered service by name
    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).map(|entry| entry.value().clone())
    }

    /// Names of all registered services, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Register a service under its name
    pub fn register_service(&self, service: Arc<dyn Service>) -> Arc<dyn Service> {
        self.services
            .insert(service.base().name().to_string(), service.clone());
        service
    }

    /// Stop and remove a registered service
    pub async fn unregister_service(&self, name: &str) -> Result<()> {
        let service = self
            .get_service(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        if transition_for(TransitionAction::Stop, service.base().state()).is_some() {
            service.stop().await?;
        }
        self.services.remove(name);
        Ok(())
    }

    /// Look up a service factory by type name
    pub fn service_factory(&self, type_name: &str) -> Option<Arc<dyn ServiceFactory>> {
        self.service_factories
            .get(type_name)
            .map(|entry| entry.value().clone())
    }

    /// Register a service factory
    ///
    /// Declarations waiting for the type are woken up.
    pub fn register_service_factory(
        &self,
        factory: Arc<dyn ServiceFactory>,
    ) -> Arc<dyn ServiceFactory> {
        let type_name = factory.type_name().to_string();
        self.service_factories.insert(type_name.clone(), factory.clone());
        self.events
            .emit(RuntimeEvent::ServiceFactoryRegistered { type_name });
        factory
    }

    /// Remove a service factory
    pub fn unregister_service_factory(&self, type_name: &str) {
        self.service_factories.remove(type_name);
    }

    /// Register an interceptor factory
    pub fn register_interceptor_factory(
        &self,
        factory: Arc<dyn InterceptorFactory>,
    ) -> Arc<dyn InterceptorFactory> {
        let type_name = factory.type_name().to_string();
        self.interceptor_factories
            .insert(type_name.clone(), factory.clone());
        self.events
            .emit(RuntimeEvent::InterceptorFactoryRegistered { type_name });
        factory
    }

    /// Remove an interceptor factory
    pub fn unregister_interceptor_factory(&self, type_name: &str) {
        self.interceptor_factories.remove(type_name);
    }

    /// Build an interceptor from its definition
    ///
    /// A string names a type without options; an object carries the type
    /// under `type`. Unknown types and failing factories are skipped with a
    /// warning so one bad interceptor does not lose the endpoint.
    pub fn instantiate_interceptor(&self, definition: &Value) -> Option<Arc<dyn Interceptor>> {
        let type_name = match definition {
            Value::String(name) => name.as_str(),
            Value::Object(map) => map.get("type").and_then(Value::as_str)?,
            _ => return None,
        };
        let Some(factory) = self.interceptor_factories.get(type_name) else {
            warn!(r#type = %type_name, "unknown interceptor type");
            return None;
        };
        match factory.create(definition) {
            Ok(interceptor) => Some(interceptor),
            Err(err) => {
                warn!(r#type = %type_name, error = %err, "interceptor creation failed");
                None
            }
        }
    }

    pub(crate) fn service_state_changed(
        &self,
        service: &str,
        from: ServiceState,
        to: ServiceState,
    ) {
        self.events.emit(RuntimeEvent::ServiceStateChanged {
            service: service.to_string(),
            from,
            to,
        });
    }

    /// Declare one service from a config carrying its name
    pub async fn declare_service(self: &Arc<Self>, config: Value) -> Result<Arc<dyn Service>> {
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::configuration("service declaration needs a name"))?
            .to_string();
        let result = self.context.declare_service(&name, config).await;
        self.context.resolve_outstanding_endpoint_connections();
        self.context.validate_endpoints();
        result
    }

    /// Declare several services from an object keyed by service name
    ///
    /// Declarations run concurrently in no particular order. A failing
    /// declaration is dropped with a warning; the others proceed.
    pub async fn declare_services(
        self: &Arc<Self>,
        configs: Value,
    ) -> Result<HashMap<String, Arc<dyn Service>>> {
        let Value::Object(configs) = configs else {
            return Err(Error::configuration(
                "declare_services expects an object keyed by service name",
            ));
        };

        let declarations = configs.into_iter().map(|(name, config)| {
            let context = self.context.clone();
            async move {
                let result = context.declare_service(&name, config).await;
                (name, result)
            }
        });
        let results = join_all(declarations).await;

        self.context.resolve_outstanding_endpoint_connections();
        self.context.validate_endpoints();

        let mut services = HashMap::new();
        for (name, result) in results {
            match result {
                Ok(service) => {
                    services.insert(name, service);
                }
                Err(err) => warn!(service = %name, error = %err, "declaration dropped"),
            }
        }
        Ok(services)
    }

    async fn execute_command(&self, command: Value) -> Result<Value> {
        let action = command
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnknownCommand("<missing action>".to_string()))?
            .to_string();
        let options = match command.get("options") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => JsonOptions::full(),
        };

        if action == "list" {
            let services: Vec<Value> = self
                .service_names()
                .iter()
                .filter_map(|name| self.get_service(name))
                .map(|service| service.to_json_with_options(options))
                .collect();
            return Ok(Value::Array(services));
        }

        let name = command
            .get("service")
            .and_then(Value::as_str)
            .unwrap_or("<missing service>");
        let service = self
            .get_service(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;

        match action.as_str() {
            "get" => Ok(service.to_json_with_options(options)),
            "start" => {
                service.start().await?;
                Ok(Value::Null)
            }
            "stop" => {
                service.stop().await?;
                Ok(Value::Null)
            }
            "restart" => {
                service.restart().await?;
                Ok(Value::Null)
            }
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    fn children(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .iter()
            .filter(|entry| entry.key() != self.base.name())
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl Service for ServiceProvider {
    fn base(&self) -> &ServiceBase {
        &self.base
    }

    /// Administrative command surface
    ///
    /// `{action: "list"}` snapshots all services; `get`, `start`, `stop` and
    /// `restart` address one service via `service`. An array of commands is
    /// executed in order.
    async fn execute(&self, command: Value) -> Result<Value> {
        if let Value::Array(commands) = command {
            let mut results = Vec::with_capacity(commands.len());
            for command in commands {
                results.push(self.execute_command(command).await?);
            }
            return Ok(Value::Array(results));
        }
        self.execute_command(command).await
    }

    /// Starts all autostart services; one rejection fails the provider start
    async fn on_start(&self) -> Result<()> {
        self.base.open_endpoint_connections();
        let starting: Vec<Arc<dyn Service>> = self
            .children()
            .into_iter()
            .filter(|service| {
                service.autostart()
                    && transition_for(TransitionAction::Start, service.base().state()).is_some()
            })
            .collect();
        try_join_all(starting.iter().map(|service| service.start())).await?;
        Ok(())
    }

    /// Stops every registered service exactly once; failures are logged and
    /// do not keep other services from stopping
    async fn on_stop(&self) -> Result<()> {
        let stopping: Vec<Arc<dyn Service>> = self
            .children()
            .into_iter()
            .filter(|service| {
                transition_for(TransitionAction::Stop, service.base().state()).is_some()
            })
            .collect();
        let results = join_all(stopping.iter().map(|service| service.stop())).await;
        for (service, result) in stopping.iter().zip(results) {
            if let Err(err) = result {
                error!(service = %service.base().name(), error = %err, "stop failed");
            }
        }
        self.base.close_endpoint_connections();
        Ok(())
    }

    fn to_json_with_options(&self, options: JsonOptions) -> Value {
        let mut json = serde_json::Map::new();
        json.insert("type".into(), Value::String(self.base.type_name().into()));
        if options.include_name {
            json.insert("name".into(), Value::String(self.base.name().into()));
        }
        if options.include_runtime_info {
            json.insert(
                "state".into(),
                serde_json::to_value(self.base.state()).expect("state"),
            );
        }

        let mut services = serde_json::Map::new();
        for name in self.service_names() {
            if name == self.base.name() {
                continue;
            }
            if let Some(service) = self.get_service(&name) {
                services.insert(name, service.to_json_with_options(options));
            }
        }
        json.insert("services".into(), Value::Object(services));

        Value::Object(json)
    }
}
