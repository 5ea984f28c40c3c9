//! Endpoint definitions
//!
//! A definition describes one endpoint of a service before it is built:
//! direction, connection expressions, receiver binding and interceptors.
//! Definitions come from two places: the factory's predefined set (marked
//! default) and the per-instance service configuration, which overrides the
//! predefined entries key-wise.

use patchbay_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection target(s) of an endpoint definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectedSpec {
    /// A single endpoint expression
    One(String),
    /// Several expressions, forcing a multi-sending endpoint
    Many(Vec<String>),
}

impl ConnectedSpec {
    /// All expressions in declaration order
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            Self::One(expr) => vec![expr.as_str()],
            Self::Many(exprs) => exprs.iter().map(String::as_str).collect(),
        }
    }

    fn is_self(&self) -> bool {
        matches!(self, Self::One(expr) if expr == "self")
    }
}

/// Declarative description of an endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointDefinition {
    /// Receiving endpoint
    #[serde(rename = "in")]
    pub in_: bool,
    /// Sending endpoint
    pub out: bool,
    /// Predefined endpoint, filtered from JSON snapshots by default
    pub default: bool,
    /// Force a multi-sending endpoint even for a single target
    pub multi: bool,
    /// Expression(s) naming the connection target(s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<ConnectedSpec>,
    /// Name of the owning service's receiver handling inbound messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive: Option<String>,
    /// Interceptor definitions, applied in order on send
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interceptors: Vec<Value>,
}

impl EndpointDefinition {
    /// Parse a raw definition value
    ///
    /// A string is shorthand for `{connected: <string>}`.
    pub fn from_value(raw: &Value) -> Result<Self, Error> {
        match raw {
            Value::String(expr) => Ok(Self {
                connected: Some(ConnectedSpec::One(expr.clone())),
                ..Self::default()
            }),
            Value::Object(_) => {
                serde_json::from_value(raw.clone()).map_err(|e| Error::Endpoint {
                    message: format!("invalid endpoint definition: {e}"),
                })
            }
            other => Err(Error::Endpoint {
                message: format!("invalid endpoint definition: {other}"),
            }),
        }
    }

    /// Decide which endpoint kind the definition resolves to
    ///
    /// Decision order: `connected == "self"`, then `in`/`receive`, then
    /// multi-sending, then sending.
    pub fn kind(&self) -> EndpointKind {
        if self.connected.as_ref().is_some_and(ConnectedSpec::is_self) {
            return EndpointKind::SelfConnectedDefault;
        }

        if self.in_ || self.receive.is_some() {
            return if self.default {
                EndpointKind::ReceivingDefault
            } else {
                EndpointKind::Receiving
            };
        }

        if self.multi || matches!(self.connected, Some(ConnectedSpec::Many(_))) {
            return EndpointKind::MultiSending;
        }

        if self.default {
            EndpointKind::SendingDefault
        } else {
            EndpointKind::Sending
        }
    }
}

/// The endpoint kinds a definition can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Receiving endpoint connected to itself, e.g. the logger's log input
    SelfConnectedDefault,
    /// Predefined receiving endpoint
    ReceivingDefault,
    /// Receiving endpoint
    Receiving,
    /// Sending endpoint with several connections
    MultiSending,
    /// Predefined sending endpoint
    SendingDefault,
    /// Sending endpoint
    Sending,
}

impl EndpointKind {
    /// Can messages be received over this endpoint
    pub fn is_in(self) -> bool {
        matches!(
            self,
            Self::SelfConnectedDefault | Self::ReceivingDefault | Self::Receiving
        )
    }

    /// Can messages be sent over this endpoint
    pub fn is_out(self) -> bool {
        matches!(self, Self::MultiSending | Self::SendingDefault | Self::Sending)
    }

    /// Predefined endpoints are filtered from snapshots unless asked for
    pub fn is_default(self) -> bool {
        matches!(
            self,
            Self::SelfConnectedDefault | Self::ReceivingDefault | Self::SendingDefault
        )
    }
}
