//! JSON snapshot options
//!
//! The wire format consumed by external admin tooling is produced by
//! `to_json_with_options`; these flags select what goes into it.

use serde::{Deserialize, Serialize};

/// Flags controlling the JSON snapshot of a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonOptions {
    /// Include runtime information like state and log level
    pub include_runtime_info: bool,
    /// Include predefined (default) endpoints
    pub include_defaults: bool,
    /// Include the service name
    pub include_name: bool,
    /// Include configuration attribute values
    pub include_config: bool,
    /// Include attributes flagged private in their schema
    pub include_private: bool,
}

impl JsonOptions {
    /// Everything except private attributes; used by the plain `toJSON` form
    pub fn full() -> Self {
        Self {
            include_runtime_info: true,
            include_defaults: true,
            include_name: true,
            include_config: true,
            include_private: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let options: JsonOptions =
            serde_json::from_value(serde_json::json!({"includeRuntimeInfo": true})).unwrap();
        assert!(options.include_runtime_info);
        assert!(!options.include_private);
    }
}
