//! Store configuration and the client seam the bootstrapper talks to.

use crate::connection::{
    ConnectionStringOptions, Credentials, ResolvedConnection, parse_connection_string,
};
use crate::conventions::{DocumentType, PersistenceSettings, TagNamingConvention};
use crate::error::{Result, StoreError};
use hostkit::ConfigProvider;
use std::fmt;
use std::sync::Arc;
use uuid::{Uuid, uuid};

/// Resource-manager id used when the connection string does not set one.
/// Keeps separate store instances from colliding in distributed-transaction
/// coordination.
pub const DEFAULT_RESOURCE_MANAGER_ID: Uuid = uuid!("1c1f5e6e-4b0b-4f3d-9a4a-8d6c2b7e5f10");

/// Fully resolved configuration for one store handle.
#[derive(Clone)]
pub struct StoreConfiguration {
    url: String,
    resource_manager_id: Uuid,
    database: Option<String>,
    credentials: Option<Credentials>,
    max_requests_per_session: u32,
    compression_enabled: bool,
    tag_naming: TagNamingConvention,
}

impl StoreConfiguration {
    /// Assemble a configuration from parsed options and the settings context.
    #[must_use]
    pub fn new(
        options: ConnectionStringOptions,
        settings: &PersistenceSettings,
        max_requests_per_session: u32,
    ) -> Self {
        Self {
            url: options.url,
            resource_manager_id: options
                .resource_manager_id
                .unwrap_or(DEFAULT_RESOURCE_MANAGER_ID),
            database: options.database,
            credentials: options.credentials,
            max_requests_per_session,
            compression_enabled: settings.compression(),
            tag_naming: settings.tag_naming(),
        }
    }

    /// Build the configuration for a resolved connection.
    ///
    /// `database_override` wins over any database named in the connection string.
    /// Empty database names count as absent.
    ///
    /// # Errors
    /// Returns `PersistenceError::Configuration` if the connection string is
    /// invalid or the request-limit setting is not a positive integer.
    pub fn build(
        resolved: &ResolvedConnection,
        database_override: Option<&str>,
        settings: &PersistenceSettings,
        config: &dyn ConfigProvider,
    ) -> Result<Self> {
        let mut options = match resolved {
            ResolvedConnection::ConnectionString(s) => parse_connection_string(s)?,
            ResolvedConnection::Defaults { url, database } => ConnectionStringOptions {
                database: Some(database.clone()).filter(|d| !d.is_empty()),
                ..ConnectionStringOptions::for_url(url.clone())
            },
        };

        if let Some(database) = database_override.filter(|d| !d.is_empty()) {
            options.database = Some(database.to_owned());
        }

        let max_requests = crate::conventions::max_requests_per_session(config)?;
        Ok(Self::new(options, settings, max_requests))
    }

    /// Same server, no database, compression off: used for administrative calls.
    #[must_use]
    pub fn server_admin(&self) -> Self {
        Self {
            database: None,
            compression_enabled: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn resource_manager_id(&self) -> Uuid {
        self.resource_manager_id
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn max_requests_per_session(&self) -> u32 {
        self.max_requests_per_session
    }

    #[must_use]
    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    /// Collection name for a document type, per the configured convention.
    #[must_use]
    pub fn tag_for(&self, ty: &DocumentType<'_>) -> Option<String> {
        (self.tag_naming)(ty)
    }
}

impl fmt::Debug for StoreConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfiguration")
            .field("url", &self.url)
            .field("resource_manager_id", &self.resource_manager_id)
            .field("database", &self.database)
            .field("credentials", &self.credentials)
            .field("max_requests_per_session", &self.max_requests_per_session)
            .field("compression_enabled", &self.compression_enabled)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for StoreConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(db) = &self.database {
            write!(f, " database={db}")?;
        }
        if let Some(c) = &self.credentials {
            write!(f, " user={} password=***", c.user)?;
        }
        write!(
            f,
            " resource_manager_id={} max_requests_per_session={} compression={}",
            self.resource_manager_id, self.max_requests_per_session, self.compression_enabled
        )
    }
}

/// Client handle for a document database.
pub trait DocumentStore: Send + Sync {
    fn configuration(&self) -> &StoreConfiguration;

    /// Prepare the handle for use. Idempotent.
    ///
    /// # Errors
    /// Implementation-defined; the HTTP client never fails here.
    fn initialize(&self) -> std::result::Result<(), StoreError>;

    /// List up to `page_size` database names.
    ///
    /// # Errors
    /// `StoreError` on network failure or if the store is not initialized.
    fn list_databases(&self, page_size: usize) -> std::result::Result<Vec<String>, StoreError>;

    /// Create the named database if it does not exist yet.
    ///
    /// # Errors
    /// `StoreError` on network failure or if the store is not initialized.
    fn ensure_database_exists(&self, name: &str) -> std::result::Result<(), StoreError>;

    /// Open a working session against the configured database.
    ///
    /// # Errors
    /// `StoreError::InvalidOperation` if the store is not initialized.
    fn open_session(&self) -> std::result::Result<Box<dyn DocumentSession>, StoreError>;
}

/// One unit of work against the store. Writes are queued until `save_changes`.
pub trait DocumentSession: Send {
    fn database(&self) -> Option<&str>;

    /// Fetch a document by id; `None` if it does not exist.
    ///
    /// # Errors
    /// `StoreError` on network failure or when the request limit is exhausted.
    fn load(&mut self, id: &str) -> std::result::Result<Option<serde_json::Value>, StoreError>;

    /// Queue a put of `body` under `id`.
    fn store(&mut self, id: &str, ty: &DocumentType<'_>, body: serde_json::Value);

    /// Queue a delete of `id`.
    fn delete(&mut self, id: &str);

    fn has_changes(&self) -> bool;

    /// Send all queued commands in one batch.
    ///
    /// # Errors
    /// `StoreError` on network failure or when the request limit is exhausted.
    fn save_changes(&mut self) -> std::result::Result<(), StoreError>;

    /// Requests issued so far by this session.
    fn request_count(&self) -> u32;
}

/// Builds store handles from configuration.
pub trait StoreFactory {
    fn create(&self, config: StoreConfiguration) -> Arc<dyn DocumentStore>;
}
