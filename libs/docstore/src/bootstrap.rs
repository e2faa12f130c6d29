//! The persistence bootstrapper.
//!
//! One call does, in order:
//! 1. bail out if a [`SessionFactory`] is already registered;
//! 2. resolve the connection ([`crate::connection::resolve`]);
//! 3. build the [`StoreConfiguration`] and create the store;
//! 4. ensure the database exists, when auto-creation is on;
//! 5. probe reachability, downgrading failures to a warning;
//! 6. register the store, the session factory and the unit of work.
//!
//! Steps 1 and 6 are not atomic as a group: two threads bootstrapping the
//! same registry concurrently can both pass the guard and both register.

use crate::connection::{self, ConnectionSource, DEFAULT_CONNECTION_STRING_NAME};
use crate::conventions::PersistenceSettings;
use crate::error::Result;
use crate::session::{SessionFactory, UnitOfWork};
use crate::store::{DocumentStore, StoreConfiguration, StoreFactory};
use hostkit::{ComponentRegistry, ConfigProvider, Lifetime};
use std::fmt;
use std::sync::Arc;

/// Result of a bootstrap call.
pub enum BootstrapOutcome {
    /// Components were registered. `reachable` reports the probe result.
    Registered {
        store: Arc<dyn DocumentStore>,
        reachable: bool,
    },
    /// A session factory was already registered; nothing was done.
    AlreadyConfigured,
}

impl BootstrapOutcome {
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        match self {
            BootstrapOutcome::Registered { store, .. } => Some(store),
            BootstrapOutcome::AlreadyConfigured => None,
        }
    }
}

impl fmt::Debug for BootstrapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapOutcome::Registered { store, reachable } => f
                .debug_struct("Registered")
                .field("store", store.configuration())
                .field("reachable", reachable)
                .finish(),
            BootstrapOutcome::AlreadyConfigured => f.write_str("AlreadyConfigured"),
        }
    }
}

/// Configures document-store persistence into a component registry.
pub struct Bootstrapper<'a, F> {
    settings: &'a PersistenceSettings,
    config: &'a dyn ConfigProvider,
    factory: F,
}

impl<'a, F: StoreFactory> Bootstrapper<'a, F> {
    #[must_use]
    pub fn new(settings: &'a PersistenceSettings, config: &'a dyn ConfigProvider, factory: F) -> Self {
        Self {
            settings,
            config,
            factory,
        }
    }

    /// Resolve `source`, build the store and register it.
    ///
    /// `database` overrides any database named by the connection string.
    ///
    /// # Errors
    /// Returns `PersistenceError::Configuration` for missing or invalid
    /// connection information or settings, and `PersistenceError::Store` for a
    /// non-network failure while ensuring the database exists. An unreachable
    /// store is never an error.
    pub fn configure<R: ComponentRegistry>(
        &self,
        registry: &R,
        source: &ConnectionSource,
        database: Option<&str>,
    ) -> Result<BootstrapOutcome> {
        if already_configured(registry) {
            return Ok(BootstrapOutcome::AlreadyConfigured);
        }

        let resolved = connection::resolve(source, self.config, self.settings)?;
        let store_config =
            StoreConfiguration::build(&resolved, database, self.settings, self.config)?;
        let store = self.factory.create(store_config);
        self.finish(registry, store)
    }

    /// Use the `NServiceBus.Persistence` connection string, or the local defaults.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_default<R: ComponentRegistry>(&self, registry: &R) -> Result<BootstrapOutcome> {
        self.configure(registry, &ConnectionSource::Default, None)
    }

    /// Use the named connection string.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_named<R: ComponentRegistry>(
        &self,
        registry: &R,
        name: &str,
    ) -> Result<BootstrapOutcome> {
        self.configure(registry, &ConnectionSource::Named(name.to_owned()), None)
    }

    /// Use the named connection string with an explicit database.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_named_with_database<R: ComponentRegistry>(
        &self,
        registry: &R,
        name: &str,
        database: &str,
    ) -> Result<BootstrapOutcome> {
        self.configure(
            registry,
            &ConnectionSource::Named(name.to_owned()),
            Some(database),
        )
    }

    /// Use `connection_string` verbatim.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_explicit<R: ComponentRegistry>(
        &self,
        registry: &R,
        connection_string: &str,
    ) -> Result<BootstrapOutcome> {
        self.configure(
            registry,
            &ConnectionSource::Explicit(connection_string.to_owned()),
            None,
        )
    }

    /// Ask `callback` for the connection string.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_with_callback<R, C>(
        &self,
        registry: &R,
        callback: C,
        database: Option<&str>,
    ) -> Result<BootstrapOutcome>
    where
        R: ComponentRegistry,
        C: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.configure(registry, &ConnectionSource::callback(callback), database)
    }

    /// Register a store the caller already built. Skips resolution and construction.
    ///
    /// # Errors
    /// See [`Bootstrapper::configure`].
    pub fn configure_with_store<R: ComponentRegistry>(
        &self,
        registry: &R,
        store: Arc<dyn DocumentStore>,
    ) -> Result<BootstrapOutcome> {
        if already_configured(registry) {
            return Ok(BootstrapOutcome::AlreadyConfigured);
        }
        self.finish(registry, store)
    }

    fn finish<R: ComponentRegistry>(
        &self,
        registry: &R,
        store: Arc<dyn DocumentStore>,
    ) -> Result<BootstrapOutcome> {
        self.ensure_database_exists(store.configuration())?;
        let reachable = verify_connection(store.as_ref());
        register_components(registry, Arc::clone(&store));

        tracing::info!(
            store = %store.configuration(),
            reachable,
            "document store persistence configured"
        );
        Ok(BootstrapOutcome::Registered { store, reachable })
    }

    /// Create the target database through a throwaway server-level handle.
    ///
    /// Network failures are swallowed: during install the server may not be up
    /// yet, and that must not block configuration.
    fn ensure_database_exists(&self, config: &StoreConfiguration) -> Result<()> {
        if !self.settings.auto_create_database() {
            return Ok(());
        }
        let Some(database) = config.database() else {
            return Ok(());
        };

        let admin = self.factory.create(config.server_admin());
        let outcome = admin
            .initialize()
            .and_then(|()| admin.ensure_database_exists(database));
        drop(admin);

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_network() => {
                tracing::debug!(
                    database,
                    url = config.url(),
                    error = %e,
                    "could not ensure database exists; continuing"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn already_configured<R: ComponentRegistry>(registry: &R) -> bool {
    let configured = registry.is_registered::<SessionFactory>();
    if configured {
        tracing::debug!("document store persistence already configured; skipping");
    }
    configured
}

/// Initialize `store` and make one lightweight call against it.
///
/// Returns whether the store answered. A failure is logged as a single warning
/// and otherwise ignored: the store may come up before it is first used.
#[must_use]
pub fn verify_connection(store: &dyn DocumentStore) -> bool {
    let outcome = store.initialize().and_then(|()| store.list_databases(1));
    match outcome {
        Ok(_) => true,
        Err(e) => {
            let url = store.configuration().url();
            tracing::warn!(
                url,
                error = %e,
                "Document store at {url} could not be contacted. Persistence has been configured, \
                 but operations that need the store will fail until it is reachable. To use a \
                 different server, define a connection string named \
                 '{DEFAULT_CONNECTION_STRING_NAME}', e.g. 'Url=http://host:8080'."
            );
            false
        }
    }
}

/// Register the store singleton, the session factory (singleton) and the unit
/// of work (per call).
pub fn register_components<R: ComponentRegistry>(registry: &R, store: Arc<dyn DocumentStore>) {
    registry.register_singleton::<dyn DocumentStore>(Arc::clone(&store));

    let sessions = Arc::new(SessionFactory::new(store));
    let shared = Arc::clone(&sessions);
    registry.register_factory::<SessionFactory, _>(Lifetime::Singleton, move || {
        Arc::clone(&shared)
    });
    registry.register_factory::<UnitOfWork, _>(Lifetime::PerCall, move || {
        Arc::new(UnitOfWork::new(Arc::clone(&sessions)))
    });
}
