//! Unit test suite for patchbay
//!
//! Run with: `cargo test -p patchbay --test unit`

#[path = "unit/support.rs"]
mod support;

#[path = "unit/service_tests.rs"]
mod service;

#[path = "unit/declare_tests.rs"]
mod declare;

#[path = "unit/config_tests.rs"]
mod config;

#[path = "unit/provider_tests.rs"]
mod provider;
