//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the patchbay runtime
///
/// Usage errors (invalid transition, unknown command or service, missing
/// receiver) are expected to propagate to the caller. Deferred resolution
/// work is never reported through this type; it stays queued in the
/// initialization context instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A state transition was attempted from a state the transition table
    /// does not list for the action
    #[error("Can't {action} {service}")]
    InvalidState {
        /// The originating action name
        action: String,
        /// Human readable service identification, including its state
        service: String,
    },

    /// A state transition hook failed or exceeded its timeout
    #[error("{service}: transition {action} aborted: {reason}")]
    TransitionRejected {
        /// The originating action name
        action: String,
        /// Human readable service identification
        service: String,
        /// Why the transition was rejected
        reason: String,
    },

    /// Command addressed to a service that is not registered
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Command with an action the admin surface does not know
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Endpoint definition references a receiver the service does not expose
    #[error("No such method or property {service}.{receiver}")]
    UnknownReceiver {
        /// Owning service name
        service: String,
        /// The receiver named in the endpoint definition
        receiver: String,
    },

    /// No factory is registered for the requested service type
    #[error("No factory for {0}")]
    MissingFactory(String),

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Endpoint construction or delivery error
    #[error("Endpoint error: {message}")]
    Endpoint {
        /// Description of the endpoint error
        message: String,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Internal runtime error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },

    /// A declaration awaited by several concurrent callers failed
    ///
    /// The underlying error is shared between all waiters.
    #[error(transparent)]
    Shared(std::sync::Arc<Error>),
}

impl Error {
    /// Shorthand for a configuration error with a formatted message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for an internal error with a formatted message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
