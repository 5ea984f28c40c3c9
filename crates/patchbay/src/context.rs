//! Initialization context
//!
//! Declaration-order independence lives here. The context tracks three kinds
//! of outstanding work: service declarations in flight (so concurrent
//! declarations of the same name construct once), factory lookups waiting for
//! a type registered later, and endpoint connections whose target expression
//! does not resolve yet. Every newly registered service triggers a resolver
//! pass over the queued connections.

use crate::endpoint::{Connection, Endpoint, EndpointDefinition, EndpointKind};
use crate::provider::ServiceProvider;
use crate::service::{Service, ServiceFactory};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use patchbay_core::{Error, Result, RuntimeEvent};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, trace, warn};

/// Construction outcome shared between concurrent declarations
type DeclarationResult = std::result::Result<Arc<dyn Service>, Arc<Error>>;
type DeclarationFuture = Shared<BoxFuture<'static, DeclarationResult>>;
type FactoryFuture = Shared<BoxFuture<'static, Option<Arc<dyn ServiceFactory>>>>;

/// Tracks outstanding declarations, factory waits and unresolved connections
pub struct InitializationContext {
    provider: RwLock<Weak<ServiceProvider>>,
    wait_for_factories: bool,
    outstanding_services: Mutex<HashMap<String, DeclarationFuture>>,
    outstanding_factories: Mutex<HashMap<String, FactoryFuture>>,
    outstanding_connections: Mutex<Vec<(Arc<Endpoint>, String)>>,
}

impl InitializationContext {
    /// New context; `wait_for_factories` keeps declarations pending until a
    /// factory for their type registers
    pub fn new(wait_for_factories: bool) -> Self {
        Self {
            provider: RwLock::new(Weak::new()),
            wait_for_factories,
            outstanding_services: Mutex::new(HashMap::new()),
            outstanding_factories: Mutex::new(HashMap::new()),
            outstanding_connections: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_provider(&self, provider: &Arc<ServiceProvider>) {
        *self.provider.write().expect("provider lock") = Arc::downgrade(provider);
    }

    /// The owning provider, while it is still alive
    pub fn provider(&self) -> Option<Arc<ServiceProvider>> {
        self.provider.read().expect("provider lock").upgrade()
    }

    /// Declare a service by name
    ///
    /// An already registered service is configured with the given config and
    /// reused. Concurrent declarations of the same name share one
    /// construction; later callers get the shared instance with their config
    /// applied on top.
    pub async fn declare_service(
        self: &Arc<Self>,
        name: &str,
        config: Value,
    ) -> Result<Arc<dyn Service>> {
        let provider = self
            .provider()
            .ok_or_else(|| Error::internal("provider dropped"))?;

        if let Some(service) = provider.get_service(name) {
            service.configure(config).await?;
            return Ok(service);
        }

        let (declaration, in_flight) = {
            let mut outstanding = self.outstanding_services.lock().expect("services lock");
            match outstanding.get(name) {
                Some(declaration) => (declaration.clone(), true),
                None => {
                    let declaration = Self::construct(
                        self.clone(),
                        provider,
                        name.to_string(),
                        config.clone(),
                    )
                    .boxed()
                    .shared();
                    outstanding.insert(name.to_string(), declaration.clone());
                    (declaration, false)
                }
            }
        };

        let result = declaration.await;
        if !in_flight {
            self.outstanding_services
                .lock()
                .expect("services lock")
                .remove(name);
        }

        let service = result.map_err(Error::Shared)?;
        if in_flight {
            service.configure(config).await?;
        }
        Ok(service)
    }

    async fn construct(
        context: Arc<Self>,
        provider: Arc<ServiceProvider>,
        name: String,
        config: Value,
    ) -> DeclarationResult {
        let mut config = match config {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => {
                return Err(Arc::new(Error::configuration(format!(
                    "service config for {name} must be an object, got {other}"
                ))))
            }
        };
        config["name"] = Value::String(name.clone());
        let type_name = config
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(&name)
            .to_string();

        let Some(factory) = context.get_service_factory(&type_name).await else {
            return Err(Arc::new(Error::MissingFactory(type_name)));
        };

        let config = match provider.config_service() {
            Some(config_service) => config_service
                .config_for(&name, config)
                .await
                .map_err(Arc::new)?,
            None => config,
        };

        let service = factory
            .create(config.clone(), Arc::downgrade(&provider))
            .await
            .map_err(Arc::new)?;
        service
            .base()
            .apply_configuration(&service.configuration_attributes(), &config, true)
            .map_err(Arc::new)?;
        context
            .wire_endpoints(&service, factory.endpoints(), &config)
            .map_err(Arc::new)?;

        provider.register_service(service.clone());
        if let Some(config_service) = provider.config_service() {
            config_service.clear_preserved(&name);
        }
        context.resolve_outstanding_endpoint_connections();

        trace!(service = %name, r#type = %type_name, "declared");
        Ok(service)
    }

    /// Look up a service factory by type name
    ///
    /// When the factory is not registered yet and waiting is enabled, the
    /// lookup stays pending until the matching registration event arrives.
    /// Concurrent lookups of the same type share one wait.
    pub async fn get_service_factory(
        self: &Arc<Self>,
        type_name: &str,
    ) -> Option<Arc<dyn ServiceFactory>> {
        let provider = self.provider()?;
        if let Some(factory) = provider.service_factory(type_name) {
            return Some(factory);
        }
        if !self.wait_for_factories {
            return None;
        }

        let lookup = {
            let mut outstanding = self.outstanding_factories.lock().expect("factories lock");
            match outstanding.get(type_name) {
                Some(lookup) => lookup.clone(),
                None => {
                    let lookup = wait_for_factory(provider, type_name.to_string())
                        .boxed()
                        .shared();
                    outstanding.insert(type_name.to_string(), lookup.clone());
                    lookup
                }
            }
        };

        let factory = lookup.await;
        self.outstanding_factories
            .lock()
            .expect("factories lock")
            .remove(type_name);
        factory
    }

    /// Create all endpoints of a service
    ///
    /// The factory's predefined definitions are all marked default and then
    /// overridden key-wise by the `endpoints` object of the service config;
    /// configured endpoints stay non-default so snapshots show them.
    pub fn wire_endpoints(
        &self,
        service: &Arc<dyn Service>,
        predefined: BTreeMap<String, EndpointDefinition>,
        config: &Value,
    ) -> Result<()> {
        let mut definitions = predefined;
        for definition in definitions.values_mut() {
            definition.default = true;
        }
        if let Some(Value::Object(overrides)) = config.get("endpoints") {
            for (name, raw) in overrides {
                definitions.insert(name.clone(), EndpointDefinition::from_value(raw)?);
            }
        }

        for (name, definition) in &definitions {
            let endpoint = self.create_endpoint(service, name, definition)?;
            service.base().add_endpoint(endpoint);
        }
        Ok(())
    }

    fn create_endpoint(
        &self,
        service: &Arc<dyn Service>,
        name: &str,
        definition: &EndpointDefinition,
    ) -> Result<Arc<Endpoint>> {
        if let Some(receiver) = &definition.receive {
            if !service.can_receive(receiver) {
                return Err(Error::UnknownReceiver {
                    service: service.base().name().to_string(),
                    receiver: receiver.clone(),
                });
            }
        }

        let interceptors = match self.provider() {
            Some(provider) => definition
                .interceptors
                .iter()
                .filter_map(|raw| provider.instantiate_interceptor(raw))
                .collect(),
            None => Vec::new(),
        };

        let endpoint = Endpoint::new(
            name,
            service.base().name(),
            Arc::downgrade(service),
            definition.kind(),
            definition.receive.clone(),
            interceptors,
        );

        if definition.kind() == EndpointKind::SelfConnectedDefault {
            endpoint.add_connection(Connection::resolved(&endpoint));
        } else if let Some(connected) = &definition.connected {
            for expression in connected.expressions() {
                self.connect_expression(&endpoint, expression);
            }
        }

        Ok(endpoint)
    }

    /// Connect an endpoint to the target named by an expression
    ///
    /// An expression that does not resolve yet becomes a pending slot and is
    /// queued for the next resolver pass.
    pub fn connect_expression(&self, endpoint: &Arc<Endpoint>, expression: &str) {
        match self.endpoint_for_expression(expression, endpoint) {
            Some(target) => endpoint.add_connection(Connection::resolved(&target)),
            None => {
                trace!(
                    endpoint = %endpoint,
                    expression = %expression,
                    "connection deferred"
                );
                endpoint.add_connection(Connection::Pending(expression.to_string()));
                self.outstanding_connections
                    .lock()
                    .expect("connections lock")
                    .push((endpoint.clone(), expression.to_string()));
            }
        }
    }

    fn endpoint_for_expression(
        &self,
        expression: &str,
        from: &Arc<Endpoint>,
    ) -> Option<Arc<Endpoint>> {
        from.owner()?.endpoint_for_expression(expression, Some(from))
    }

    /// Retry all queued endpoint connections
    ///
    /// Resolvable entries replace their pending slot with a live connection;
    /// the rest is logged and requeued for the next pass.
    pub fn resolve_outstanding_endpoint_connections(&self) {
        let entries: Vec<_> = {
            let mut queued = self.outstanding_connections.lock().expect("connections lock");
            std::mem::take(&mut *queued)
        };

        let mut unresolved = Vec::new();
        for (endpoint, expression) in entries {
            match self.endpoint_for_expression(&expression, &endpoint) {
                Some(target) => {
                    endpoint.resolve_pending(&expression, &target);
                    trace!(endpoint = %endpoint, target = %target, "connection resolved");
                }
                None => {
                    error!(
                        endpoint = %endpoint,
                        expression = %expression,
                        "unable to connect"
                    );
                    unresolved.push((endpoint, expression));
                }
            }
        }

        self.outstanding_connections
            .lock()
            .expect("connections lock")
            .extend(unresolved);
    }

    /// Log every sending endpoint that ended up without a live connection
    pub fn validate_endpoints(&self) {
        let Some(provider) = self.provider() else {
            return;
        };
        for name in provider.service_names() {
            let Some(service) = provider.get_service(&name) else {
                continue;
            };
            for endpoint in service.base().out_endpoints() {
                if !endpoint.has_resolved_connections() {
                    error!(endpoint = %endpoint, "endpoint without connection");
                }
            }
        }
    }

    /// Number of connections still waiting for their target
    pub fn outstanding_connection_count(&self) -> usize {
        self.outstanding_connections
            .lock()
            .expect("connections lock")
            .len()
    }
}

async fn wait_for_factory(
    provider: Arc<ServiceProvider>,
    type_name: String,
) -> Option<Arc<dyn ServiceFactory>> {
    let mut events = provider.subscribe();
    // Recheck after subscribing so a registration racing the lookup is seen
    // either in the map or on the channel.
    if let Some(factory) = provider.service_factory(&type_name) {
        return Some(factory);
    }

    loop {
        match events.recv().await {
            Ok(RuntimeEvent::ServiceFactoryRegistered { type_name: registered })
                if registered == type_name =>
            {
                if let Some(factory) = provider.service_factory(&type_name) {
                    return Some(factory);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!(r#type = %type_name, missed, "factory wait lagged");
                if let Some(factory) = provider.service_factory(&type_name) {
                    return Some(factory);
                }
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
