//! Endpoint expressions
//!
//! An endpoint expression names a connection target from the point of view
//! of some endpoint: a bare name is a sibling endpoint on the same service,
//! `service(<name>).<rest>` crosses over to another service, and the literal
//! `self` loops an endpoint back onto itself.

/// Parsed form of an endpoint expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointExpression {
    /// The endpoint the expression is evaluated `from`
    SelfRef,
    /// A sibling endpoint on the same service
    Local(String),
    /// An endpoint on another service, looked up through the provider
    Foreign {
        /// Name of the other service
        service: String,
        /// Expression evaluated against that service, usually an endpoint name
        rest: String,
    },
}

impl EndpointExpression {
    /// Parse an expression; never fails, unrecognized forms are `Local`
    pub fn parse(expression: &str) -> Self {
        if expression == "self" {
            return Self::SelfRef;
        }

        if let Some(inner) = expression.strip_prefix("service(") {
            if let Some((service, rest)) = inner.split_once(')') {
                if let Some(rest) = rest.strip_prefix('.') {
                    return Self::Foreign {
                        service: service.to_string(),
                        rest: rest.to_string(),
                    };
                }
            }
        }

        Self::Local(expression.to_string())
    }
}
