//! Configuration attribute schema
//!
//! Each service type declares the configuration keys it accepts as a
//! descriptor table: dotted path, optional default, restart and privacy
//! flags. `configure()` walks the table, applies the values found in the
//! incoming config and ignores everything the table does not mention, so
//! partial and incremental merges stay cheap.

use patchbay_core::{key_value_to_object, merge, Error, Result};
use serde_json::Value;
use std::time::Duration;

/// Descriptor of one accepted configuration key
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    /// Dotted path of the key, e.g. `timeout.start`
    pub path: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Value applied at construction when the config does not mention the key
    pub default: Option<Value>,
    /// Modifying the attribute requires a service restart
    pub needs_restart: bool,
    /// Excluded from JSON snapshots unless explicitly asked for
    pub private: bool,
}

impl AttributeDefinition {
    /// New descriptor without default or flags
    pub fn new(path: &'static str, description: &'static str) -> Self {
        Self {
            path,
            description,
            default: None,
            needs_restart: false,
            private: false,
        }
    }

    /// Attach a default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the attribute as requiring a restart on change
    pub fn needs_restart(mut self) -> Self {
        self.needs_restart = true;
        self
    }

    /// Mark the attribute as private
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

/// The attributes every service accepts
///
/// Custom service types extend this list from their
/// `configuration_attributes` implementation.
pub fn base_configuration_attributes() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::new("description", "human readable description of the service"),
        AttributeDefinition::new("logLevel", "logging level")
            .with_default(Value::String("info".into())),
        AttributeDefinition::new("timeout.start", "service start timeout in seconds")
            .with_default(Value::from(20.0)),
        AttributeDefinition::new("timeout.stop", "service stop timeout in seconds")
            .with_default(Value::from(20.0)),
        AttributeDefinition::new("timeout.restart", "service restart timeout in seconds")
            .with_default(Value::from(20.0)),
    ]
}

/// Look up a dotted path inside a config value
pub fn value_at_path<'v>(config: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = config;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Insert a value at a dotted path inside a JSON object, creating
/// intermediate objects as needed
pub fn insert_at_path(json: Value, path: &str, value: Value) -> Value {
    merge(json, key_value_to_object(path, value))
}

/// Parse a duration attribute value
///
/// Accepts a number of seconds or a humantime string like `"250ms"`.
pub fn parse_duration_value(value: &Value) -> Result<Duration> {
    match value {
        Value::Number(seconds) => seconds
            .as_f64()
            .filter(|s| *s >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| Error::configuration(format!("invalid duration: {seconds}"))),
        Value::String(text) => humantime::parse_duration(text)
            .map_err(|e| Error::configuration(format!("invalid duration {text:?}: {e}"))),
        other => Err(Error::configuration(format!("invalid duration: {other}"))),
    }
}
