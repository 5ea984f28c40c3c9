//! Built-in services
//!
//! Every provider carries two services from construction on: `logger`, the
//! sink of all `log` endpoints, and `config`, which distributes configuration
//! and preserves it for services declared later.

mod config;
mod logger;

pub use config::ServiceConfig;
pub use logger::ServiceLogger;

pub(crate) use logger::trace_log_event;
