//! Structured log events
//!
//! Every service owns a `log` out endpoint wired to the logger service; the
//! events flowing over it use this schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Log severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Most verbose level
    Trace,
    /// Diagnostic details
    Debug,
    /// Regular operation
    Info,
    /// Something unexpected but handled
    Warn,
    /// A failure
    Error,
}

impl Severity {
    /// True when events of this severity pass a threshold level
    pub fn passes(self, threshold: Severity) -> bool {
        self >= threshold
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for Severity {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(crate::error::Error::configuration(format!(
                "Invalid log level: {other}. Use trace, debug, info, warn, or error"
            ))),
        }
    }
}

/// One structured log entry as sent over the `log` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    /// Severity of the entry
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Name of the originating service
    pub service: String,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Additional structured fields
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
}

impl LogEvent {
    /// Build a log event from an arbitrary payload
    ///
    /// A string payload becomes the message; an object payload contributes
    /// its `message` key and keeps the remaining keys as structured fields.
    pub fn new(severity: Severity, service: impl Into<String>, payload: Value) -> Self {
        let (message, fields) = match payload {
            Value::String(message) => (message, serde_json::Map::new()),
            Value::Object(mut map) => {
                let message = match map.remove("message") {
                    Some(Value::String(m)) => m,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                (message, map)
            }
            other => (other.to_string(), serde_json::Map::new()),
        };

        Self {
            severity,
            message,
            service: service.into(),
            timestamp: Utc::now(),
            fields,
        }
    }
}
