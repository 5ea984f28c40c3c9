//! Pluggable service orchestration runtime
//!
//! Services are state-machine-driven units of work wired together through
//! named endpoints. A [`ServiceProvider`] owns the service registry, the
//! factory registries and the built-in `logger` and `config` services;
//! declarations are order independent, with an [`InitializationContext`]
//! tracking everything that cannot resolve yet.
//!
//! ```no_run
//! use patchbay::{Service, ServiceProvider};
//! use serde_json::json;
//!
//! # async fn example() -> patchbay::Result<()> {
//! let provider = ServiceProvider::new(json!({})).await?;
//! provider.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod endpoint;
pub mod interceptor;
pub mod logging;
pub mod provider;
pub mod service;
pub mod services;

pub use context::InitializationContext;
pub use endpoint::{Connection, ConnectedSpec, Endpoint, EndpointDefinition, EndpointKind};
pub use interceptor::{Interceptor, InterceptorFactory};
pub use logging::init_logging;
pub use provider::{ProviderOptions, ServiceProvider};
pub use service::{
    base_configuration_attributes, default_endpoint_definitions, default_receive,
    AttributeDefinition, Service, ServiceBase, ServiceFactory,
};
pub use services::{ServiceConfig, ServiceLogger};

pub use patchbay_core::{
    Error, EventBus, JsonOptions, LogEvent, Result, RuntimeEvent, ServiceState, Severity,
};
