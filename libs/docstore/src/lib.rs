#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Document-store persistence for msgkit endpoints.
//!
//! The entry point is [`Bootstrapper`]: given a [`PersistenceSettings`] context
//! and the host configuration, it resolves the connection, builds the store and
//! registers it, together with a [`SessionFactory`] and a per-call
//! [`UnitOfWork`], into a [`hostkit::ComponentRegistry`].
//!
//! ```no_run
//! use docstore::{Bootstrapper, HttpStoreFactory, PersistenceSettings};
//! use hostkit::{AppConfig, ClientHub};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let settings = PersistenceSettings::new("billing");
//! let hub = ClientHub::new();
//!
//! Bootstrapper::new(&settings, &config, HttpStoreFactory::default()).configure_default(&hub)?;
//! let sessions = hub.get::<docstore::SessionFactory>()?;
//! # let _ = sessions;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod connection;
pub mod conventions;
pub mod error;
pub mod http_store;
pub mod session;
pub mod store;

pub use bootstrap::{BootstrapOutcome, Bootstrapper, register_components, verify_connection};
pub use connection::{
    ConnectionSource, ConnectionStringOptions, Credentials, DEFAULT_CONNECTION_STRING_NAME,
    DEFAULT_URL, ResolvedConnection, parse_connection_string, resolve,
};
pub use conventions::{
    DEFAULT_MAX_REQUESTS_PER_SESSION, DocumentType, MAX_REQUESTS_SETTING, PersistenceOptions,
    PersistenceSettings,
};
pub use error::{PersistenceError, Result, StoreError};
pub use http_store::{HttpDocumentStore, HttpStoreFactory};
pub use session::{SessionFactory, UnitOfWork};
pub use store::{DocumentSession, DocumentStore, StoreConfiguration, StoreFactory};
