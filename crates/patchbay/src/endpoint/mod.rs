//! Endpoints
//!
//! A named, typed connection point on a service. Sending endpoints carry an
//! interceptor chain and a set of connections to receiving endpoints on other
//! services. Connections are an explicit tagged state: `Pending` holds the
//! unresolved expression of a forward reference until a resolver pass finds
//! the target, `Resolved` holds the live endpoint.

mod definition;

pub use definition::{ConnectedSpec, EndpointDefinition, EndpointKind};

use crate::interceptor::Interceptor;
use crate::service::Service;
use patchbay_core::{JsonOptions, Result};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::trace;

/// One connection slot of an endpoint
#[derive(Clone)]
pub enum Connection {
    /// Forward reference whose target is not registered yet
    Pending(String),
    /// Live connection to another endpoint
    Resolved(Weak<Endpoint>),
}

impl Connection {
    /// Build a resolved connection to a target endpoint
    pub fn resolved(target: &Arc<Endpoint>) -> Self {
        Self::Resolved(Arc::downgrade(target))
    }
}

/// A named connection point owned by a service
pub struct Endpoint {
    name: String,
    owner_name: String,
    owner: Weak<dyn Service>,
    kind: EndpointKind,
    receive: Option<String>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    connections: RwLock<Vec<Connection>>,
    open: AtomicBool,
}

impl Endpoint {
    /// Create an endpoint; connections are added afterwards by the context
    pub fn new(
        name: impl Into<String>,
        owner_name: impl Into<String>,
        owner: Weak<dyn Service>,
        kind: EndpointKind,
        receive: Option<String>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            owner_name: owner_name.into(),
            owner,
            kind,
            receive,
            interceptors,
            connections: RwLock::new(Vec::new()),
            open: AtomicBool::new(false),
        })
    }

    /// Endpoint name, unique within its service
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning service, while it is still alive
    pub fn owner(&self) -> Option<Arc<dyn Service>> {
        self.owner.upgrade()
    }

    /// Kind decided from the definition flags
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Messages can arrive here
    pub fn is_in(&self) -> bool {
        self.kind.is_in()
    }

    /// Messages can leave from here
    pub fn is_out(&self) -> bool {
        self.kind.is_out()
    }

    /// Predefined endpoint, filtered from snapshots unless asked for
    pub fn is_default(&self) -> bool {
        self.kind.is_default()
    }

    /// Whether connection resources are active
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Receiver binding handling inbound messages, if any
    pub fn receive_name(&self) -> Option<&str> {
        self.receive.as_deref()
    }

    /// Globally unique identification, `service(<owner>).<name>`
    pub fn identifier(&self) -> String {
        format!("service({}).{}", self.owner_name, self.name)
    }

    /// Snapshot of the connection slots
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().expect("connections lock").clone()
    }

    /// Add a connection slot
    pub fn add_connection(&self, connection: Connection) {
        self.connections
            .write()
            .expect("connections lock")
            .push(connection);
    }

    /// Replace the pending slot for `expression` with a live connection
    ///
    /// Used by the resolver pass once a forward reference becomes resolvable.
    pub fn resolve_pending(&self, expression: &str, target: &Arc<Endpoint>) {
        let mut connections = self.connections.write().expect("connections lock");
        connections.retain(|c| !matches!(c, Connection::Pending(e) if e == expression));
        connections.push(Connection::resolved(target));
    }

    /// True when at least one connection is live
    pub fn has_resolved_connections(&self) -> bool {
        self.connections
            .read()
            .expect("connections lock")
            .iter()
            .any(|c| matches!(c, Connection::Resolved(w) if w.upgrade().is_some()))
    }

    /// Mark connection resources active; idempotent
    pub fn open_connections(&self) {
        self.open.store(true, Ordering::Relaxed);
    }

    /// Mark connection resources inactive; idempotent
    pub fn close_connections(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Send a message over all live connections
    ///
    /// The message first passes the interceptor chain in order. Slots still
    /// pending are skipped with a trace log. Returns the result of the last
    /// delivery, `Null` when nothing was delivered.
    pub async fn send(&self, mut message: Value) -> Result<Value> {
        for interceptor in &self.interceptors {
            message = interceptor.intercept(message).await?;
        }

        let connections = self.connections();
        let mut result = Value::Null;
        for connection in connections {
            match connection {
                Connection::Pending(expression) => {
                    trace!(
                        endpoint = %self.identifier(),
                        expression = %expression,
                        "send dropped, connection still pending"
                    );
                }
                Connection::Resolved(target) => {
                    if let Some(target) = target.upgrade() {
                        result = target.deliver(message.clone()).await?;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Hand an inbound message to the owning service's receiver binding
    pub async fn deliver(&self, message: Value) -> Result<Value> {
        let Some(receiver) = self.receive.as_deref() else {
            trace!(endpoint = %self.identifier(), "delivery dropped, no receiver bound");
            return Ok(Value::Null);
        };
        let Some(owner) = self.owner.upgrade() else {
            trace!(endpoint = %self.identifier(), "delivery dropped, owner gone");
            return Ok(Value::Null);
        };
        owner.receive(receiver, message).await
    }

    /// JSON form used inside service snapshots
    pub fn to_json_with_options(&self, options: JsonOptions) -> Value {
        let mut json = serde_json::Map::new();
        if self.is_in() {
            json.insert("in".into(), Value::Bool(true));
        }
        if self.is_out() {
            json.insert("out".into(), Value::Bool(true));
        }
        if options.include_runtime_info {
            json.insert("open".into(), Value::Bool(self.is_open()));
        }

        let targets: Vec<Value> = self
            .connections()
            .iter()
            .map(|connection| match connection {
                Connection::Pending(expression) => Value::String(expression.clone()),
                Connection::Resolved(target) => Value::String(
                    target
                        .upgrade()
                        .map_or_else(|| "(gone)".to_string(), |t| t.identifier()),
                ),
            })
            .collect();
        match targets.len() {
            0 => {}
            1 => {
                json.insert("connected".into(), targets.into_iter().next().expect("one"));
            }
            _ => {
                json.insert("connected".into(), Value::Array(targets));
            }
        }

        Value::Object(json)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("identifier", &self.identifier())
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("connections", &self.connections.read().expect("lock").len())
            .finish()
    }
}
