//! Persistence settings and the naming conventions applied to every store.
//!
//! All knobs that influence a bootstrap call live in [`PersistenceSettings`],
//! which is passed explicitly to the bootstrapper. Nothing here is global.

use crate::error::{PersistenceError, Result};
use hostkit::ConfigProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// App setting that overrides the per-session request limit.
pub const MAX_REQUESTS_SETTING: &str =
    "NServiceBus/Persistence/RavenDB/MaxNumberOfRequestsPerSession";

/// Request limit applied when the override setting is absent.
pub const DEFAULT_MAX_REQUESTS_PER_SESSION: u32 = 100;

/// Produces the database name used when no connection string is available.
pub type DatabaseNamingConvention = Arc<dyn Fn() -> String + Send + Sync>;

/// Maps a document type to the collection ("tag") its documents are stored under.
pub type TagNamingConvention = Arc<dyn Fn(&DocumentType<'_>) -> Option<String> + Send + Sync>;

/// Identity of a document type as seen by the tag naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentType<'a> {
    type_name: &'a str,
}

impl DocumentType<'static> {
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<'a> DocumentType<'a> {
    #[must_use]
    pub fn new(type_name: &'a str) -> Self {
        Self { type_name }
    }

    /// Fully-qualified name as given.
    #[must_use]
    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    /// Name without module path or generic arguments: `a::b::Foo<c::Bar>` → `Foo`.
    #[must_use]
    pub fn short_name(&self) -> &'a str {
        let base = self
            .type_name
            .split_once('<')
            .map_or(self.type_name, |(head, _)| head);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// Default tag convention: the short type name, minus a trailing `Data` when
/// something remains (`OrderSagaData` → `OrderSaga`).
#[must_use]
pub fn default_tag_name(ty: &DocumentType<'_>) -> Option<String> {
    let short = ty.short_name();
    if short.is_empty() {
        return None;
    }
    let tag = match short.strip_suffix("Data") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => short,
    };
    Some(tag.to_owned())
}

/// Settings context consulted by every bootstrap call.
#[derive(Clone)]
pub struct PersistenceSettings {
    endpoint_name: String,
    database_naming: Option<DatabaseNamingConvention>,
    tag_naming: Option<TagNamingConvention>,
    compression: bool,
    auto_create_database: bool,
}

impl PersistenceSettings {
    /// Settings for the given endpoint with compression on and database auto-creation off.
    #[must_use]
    pub fn new(endpoint_name: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            database_naming: None,
            tag_naming: None,
            compression: true,
            auto_create_database: false,
        }
    }

    #[must_use]
    pub fn with_database_naming<F>(mut self, convention: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.database_naming = Some(Arc::new(convention));
        self
    }

    #[must_use]
    pub fn with_tag_naming<F>(mut self, convention: F) -> Self
    where
        F: Fn(&DocumentType<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.tag_naming = Some(Arc::new(convention));
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    #[must_use]
    pub fn with_auto_create_database(mut self, enabled: bool) -> Self {
        self.auto_create_database = enabled;
        self
    }

    #[must_use]
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    #[must_use]
    pub fn compression(&self) -> bool {
        self.compression
    }

    #[must_use]
    pub fn auto_create_database(&self) -> bool {
        self.auto_create_database
    }

    /// Database name from the configured convention, or the endpoint name.
    #[must_use]
    pub fn database_name(&self) -> String {
        match &self.database_naming {
            Some(convention) => convention(),
            None => self.endpoint_name.clone(),
        }
    }

    /// The configured tag convention, or [`default_tag_name`].
    #[must_use]
    pub fn tag_naming(&self) -> TagNamingConvention {
        match &self.tag_naming {
            Some(convention) => Arc::clone(convention),
            None => {
                let default: TagNamingConvention = Arc::new(default_tag_name);
                default
            }
        }
    }
}

impl fmt::Debug for PersistenceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceSettings")
            .field("endpoint_name", &self.endpoint_name)
            .field("custom_database_naming", &self.database_naming.is_some())
            .field("custom_tag_naming", &self.tag_naming.is_some())
            .field("compression", &self.compression)
            .field("auto_create_database", &self.auto_create_database)
            .finish()
    }
}

/// Serializable `persistence` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceOptions {
    pub endpoint_name: Option<String>,
    pub database: Option<String>,
    pub compression: bool,
    pub auto_create_database: bool,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            endpoint_name: None,
            database: None,
            compression: true,
            auto_create_database: false,
        }
    }
}

impl PersistenceOptions {
    /// Turn the section into settings, using `fallback_endpoint` when no name is configured.
    /// A configured `database` becomes a fixed database naming convention.
    #[must_use]
    pub fn into_settings(self, fallback_endpoint: &str) -> PersistenceSettings {
        let endpoint = self
            .endpoint_name
            .unwrap_or_else(|| fallback_endpoint.to_owned());
        let mut settings = PersistenceSettings::new(endpoint)
            .with_compression(self.compression)
            .with_auto_create_database(self.auto_create_database);
        if let Some(database) = self.database {
            settings = settings.with_database_naming(move || database.clone());
        }
        settings
    }
}

/// Read the per-session request limit from app settings.
///
/// # Errors
/// Returns `PersistenceError::Configuration` if the setting is present but is
/// not a positive integer.
pub fn max_requests_per_session(config: &dyn ConfigProvider) -> Result<u32> {
    let Some(raw) = config.app_setting(MAX_REQUESTS_SETTING) else {
        return Ok(DEFAULT_MAX_REQUESTS_PER_SESSION);
    };

    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PersistenceError::config(format!(
            "app setting '{MAX_REQUESTS_SETTING}' must be a positive integer, got '{raw}'"
        ))),
    }
}
