//! Core shared library for the Reach CRM services.
//!
//! This crate exposes the primitives every service depends on: the common
//! error type, configuration loading, database pool management and logging
//! setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;

pub use config::{CoreConfig, Environment};
pub use errors::{ConfigError, ReachError, Result as CoreResult};
