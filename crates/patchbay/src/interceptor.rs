//! Interceptor seam
//!
//! Interceptors form an ordered chain on an endpoint; every message sent over
//! the endpoint passes the chain before delivery. Factories are registered on
//! the provider and referenced from endpoint definitions by type name.

use async_trait::async_trait;
use patchbay_core::Result;
use serde_json::Value;
use std::sync::Arc;

/// A single message transformation step on an endpoint
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Type name, matching the factory that created the interceptor
    fn type_name(&self) -> &str;

    /// Transform a message on its way out of the endpoint
    async fn intercept(&self, message: Value) -> Result<Value>;
}

/// Constructs interceptors from their definition options
pub trait InterceptorFactory: Send + Sync {
    /// Type name endpoint definitions reference
    fn type_name(&self) -> &str;

    /// Build an interceptor from the definition that referenced the factory
    fn create(&self, options: &Value) -> Result<Arc<dyn Interceptor>>;
}
