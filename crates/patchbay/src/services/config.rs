//! The built-in config service
//!
//! Distributes configuration to registered services and preserves the config
//! of services that do not exist yet. Preserved entries for the same name
//! deep-merge in arrival order; a later declaration picks the accumulated
//! entry up through `config_for` and clears it.

use crate::provider::ServiceProvider;
use crate::service::{Service, ServiceBase};
use async_trait::async_trait;
use patchbay_core::{key_value_to_object, merge, Error, Result, ServiceState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{trace, warn};

/// Configuration distribution service
pub struct ServiceConfig {
    base: ServiceBase,
    preserved: Mutex<HashMap<String, Value>>,
}

impl ServiceConfig {
    /// Name the config service registers under
    pub const NAME: &'static str = "config";

    pub(crate) fn create(owner: Weak<ServiceProvider>) -> Arc<Self> {
        let config = json!({"name": Self::NAME});
        Arc::new(Self {
            base: ServiceBase::new(Self::NAME, &config, owner),
            preserved: Mutex::new(HashMap::new()),
        })
    }

    /// Merge preserved configuration into a declared service config
    ///
    /// Preserved values win over the declaration. The merged result is stored
    /// back so a failed construction can retry with the same config.
    pub async fn config_for(&self, name: &str, config: Value) -> Result<Value> {
        if self.base.state() != ServiceState::Running {
            self.start().await?;
        }

        let merged = {
            let preserved = self.preserved.lock().expect("preserved lock");
            match preserved.get(name) {
                Some(preserved) => merge(config, preserved.clone()),
                None => config,
            }
        };
        self.preserved
            .lock()
            .expect("preserved lock")
            .insert(name.to_string(), merged.clone());

        trace!(service = %name, "config prepared");
        Ok(merged)
    }

    /// Drop the preserved entry of a service once it is registered
    pub fn clear_preserved(&self, name: &str) {
        self.preserved.lock().expect("preserved lock").remove(name);
    }

    /// The preserved config of a not-yet-declared service, if any
    pub fn preserved_config(&self, name: &str) -> Option<Value> {
        self.preserved
            .lock()
            .expect("preserved lock")
            .get(name)
            .cloned()
    }

    /// Set one dotted config key of one service
    ///
    /// `key` is `<service>.<path...>`; the value is routed like any other
    /// configuration update.
    pub async fn configure_value(&self, key: &str, value: Value) -> Result<()> {
        self.configure(key_value_to_object(key, value)).await
    }

    async fn update(&self, name: &str, config: Value) -> Result<()> {
        let existing = self.base.owner().and_then(|owner| owner.get_service(name));
        match existing {
            Some(service) => service.configure(config).await,
            None => {
                let merged = {
                    let mut preserved = self.preserved.lock().expect("preserved lock");
                    let current = preserved.remove(name).unwrap_or(Value::Null);
                    let merged = merge(current, config);
                    preserved.insert(name.to_string(), merged.clone());
                    merged
                };
                trace!(service = %name, config = %merged, "config preserved");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Service for ServiceConfig {
    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn autostart(&self) -> bool {
        true
    }

    /// Route configuration to services
    ///
    /// Accepts an object keyed by service name or an array of entries each
    /// carrying a `name`. Entries for registered services configure them
    /// directly; the rest is preserved.
    async fn configure(&self, config: Value) -> Result<()> {
        match config {
            Value::Null => Ok(()),
            Value::Array(entries) => {
                for mut entry in entries {
                    let Some(name) = entry
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                    else {
                        warn!(entry = %entry, "config entry without name skipped");
                        continue;
                    };
                    if let Some(map) = entry.as_object_mut() {
                        map.remove("name");
                    }
                    self.update(&name, entry).await?;
                }
                Ok(())
            }
            Value::Object(entries) => {
                for (name, entry) in entries {
                    self.update(&name, entry).await?;
                }
                Ok(())
            }
            other => Err(Error::configuration(format!(
                "config must be an object or array, got {other}"
            ))),
        }
    }
}
