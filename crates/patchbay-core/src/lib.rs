//! Domain layer for the patchbay service-orchestration runtime.
//!
//! Holds the types the runtime crate builds on: the error taxonomy, the
//! service state machine, the typed runtime event bus, endpoint expressions,
//! configuration merge semantics and the JSON snapshot options. Everything
//! here is independent of how services are actually constructed and wired.

pub mod error;
pub mod events;
pub mod expression;
pub mod log;
pub mod merge;
pub mod serialize;
pub mod state;

pub use error::{Error, Result};
pub use events::{EventBus, RuntimeEvent};
pub use expression::EndpointExpression;
pub use log::{LogEvent, Severity};
pub use merge::{key_value_to_object, merge};
pub use serialize::JsonOptions;
pub use state::{ServiceState, Transition, TransitionAction};
