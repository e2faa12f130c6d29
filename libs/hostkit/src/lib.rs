#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Host plumbing shared by msgkit endpoints.
//!
//! - [`client_hub`]: typed component registry with singleton and per-call factories
//! - [`config`]: named connection strings, app settings and typed sections
//! - [`logging`]: `tracing` subscriber setup

pub mod client_hub;
pub mod config;
pub mod logging;

pub use client_hub::{ClientHub, ClientHubError, ComponentRegistry, Lifetime};
pub use config::{
    AppConfig, ConfigError, ConfigProvider, section_or_default, section_required,
};
pub use logging::{LogFormat, LoggingConfig, init_logging};
