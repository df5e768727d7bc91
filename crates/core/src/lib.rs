//! Core functionality shared across the Flightline workspace.
//!
//! This crate provides the runtime configuration model and logging setup
//! used by the operational state aggregator and the services built on it.

pub mod config;
pub mod logging;

pub use config::{
    load_from_path, AuthConfig, ConfigError, ConnectionConfig, DashboardRole, OpsConfig,
    RefreshConfig, RetryConfig, StalenessConfig, CONFIG_SCHEMA_VERSION,
};
