#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! In-memory store doubles shared by the integration tests.

use docstore::{
    DocumentSession, DocumentStore, DocumentType, StoreConfiguration, StoreError, StoreFactory,
};
use hostkit::{ClientHub, ComponentRegistry, Lifetime};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// How `ensure_database_exists` behaves on stores built by [`FakeFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureBehavior {
    Succeed,
    Unreachable,
    InvalidOperation,
}

type Documents = Arc<Mutex<HashMap<String, Value>>>;

pub struct FakeStore {
    config: StoreConfiguration,
    reachable: bool,
    ensure: EnsureBehavior,
    initialized: AtomicBool,
    ensured: Arc<Mutex<Vec<String>>>,
    pub probes: AtomicUsize,
    pub documents: Documents,
}

impl FakeStore {
    pub fn new(config: StoreConfiguration, reachable: bool) -> Self {
        Self::with_behavior(config, reachable, EnsureBehavior::Succeed, Arc::default())
    }

    fn with_behavior(
        config: StoreConfiguration,
        reachable: bool,
        ensure: EnsureBehavior,
        ensured: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            config,
            reachable,
            ensure,
            initialized: AtomicBool::new(false),
            ensured,
            probes: AtomicUsize::new(0),
            documents: Arc::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn unreachable(&self) -> StoreError {
        StoreError::Unreachable {
            url: self.config.url().to_owned(),
            reason: "connection refused".to_owned(),
        }
    }
}

impl DocumentStore for FakeStore {
    fn configuration(&self) -> &StoreConfiguration {
        &self.config
    }

    fn initialize(&self) -> Result<(), StoreError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn list_databases(&self, _page_size: usize) -> Result<Vec<String>, StoreError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(vec!["orders".to_owned()])
        } else {
            Err(self.unreachable())
        }
    }

    fn ensure_database_exists(&self, name: &str) -> Result<(), StoreError> {
        match self.ensure {
            EnsureBehavior::Succeed => {
                self.ensured.lock().push(name.to_owned());
                Ok(())
            }
            EnsureBehavior::Unreachable => Err(self.unreachable()),
            EnsureBehavior::InvalidOperation => {
                Err(StoreError::InvalidOperation("admin rejected".to_owned()))
            }
        }
    }

    fn open_session(&self) -> Result<Box<dyn DocumentSession>, StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::InvalidOperation("not initialized".to_owned()));
        }
        Ok(Box::new(FakeSession {
            database: self.config.database().map(str::to_owned),
            documents: Arc::clone(&self.documents),
            pending: Vec::new(),
            requests: 0,
        }))
    }
}

enum Pending {
    Put(String, Value),
    Delete(String),
}

pub struct FakeSession {
    database: Option<String>,
    documents: Documents,
    pending: Vec<Pending>,
    requests: u32,
}

impl DocumentSession for FakeSession {
    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn load(&mut self, id: &str) -> Result<Option<Value>, StoreError> {
        self.requests += 1;
        Ok(self.documents.lock().get(id).cloned())
    }

    fn store(&mut self, id: &str, _ty: &DocumentType<'_>, body: Value) {
        self.pending.push(Pending::Put(id.to_owned(), body));
    }

    fn delete(&mut self, id: &str) {
        self.pending.push(Pending::Delete(id.to_owned()));
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn save_changes(&mut self) -> Result<(), StoreError> {
        self.requests += 1;
        let mut docs = self.documents.lock();
        for cmd in self.pending.drain(..) {
            match cmd {
                Pending::Put(id, body) => {
                    docs.insert(id, body);
                }
                Pending::Delete(id) => {
                    docs.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn request_count(&self) -> u32 {
        self.requests
    }
}

#[derive(Default)]
struct FactoryState {
    created: Mutex<Vec<Weak<FakeStore>>>,
    configs: Mutex<Vec<StoreConfiguration>>,
    ensured: Arc<Mutex<Vec<String>>>,
}

/// Factory that records every configuration it is asked to build.
#[derive(Clone)]
pub struct FakeFactory {
    reachable: bool,
    ensure: EnsureBehavior,
    state: Arc<FactoryState>,
}

impl FakeFactory {
    pub fn reachable() -> Self {
        Self::new(true, EnsureBehavior::Succeed)
    }

    pub fn unreachable() -> Self {
        Self::new(false, EnsureBehavior::Unreachable)
    }

    pub fn new(reachable: bool, ensure: EnsureBehavior) -> Self {
        Self {
            reachable,
            ensure,
            state: Arc::default(),
        }
    }

    pub fn created_count(&self) -> usize {
        self.state.configs.lock().len()
    }

    pub fn config(&self, index: usize) -> StoreConfiguration {
        self.state.configs.lock()[index].clone()
    }

    /// Databases ensured by any store this factory built.
    pub fn ensured(&self) -> Vec<String> {
        self.state.ensured.lock().clone()
    }

    /// Whether the store built at `index` is still referenced anywhere.
    pub fn is_alive(&self, index: usize) -> bool {
        self.state.created.lock()[index].upgrade().is_some()
    }

    pub fn store(&self, index: usize) -> Arc<FakeStore> {
        self.state.created.lock()[index]
            .upgrade()
            .expect("store was dropped")
    }
}

impl StoreFactory for FakeFactory {
    fn create(&self, config: StoreConfiguration) -> Arc<dyn DocumentStore> {
        let store = Arc::new(FakeStore::with_behavior(
            config.clone(),
            self.reachable,
            self.ensure,
            Arc::clone(&self.state.ensured),
        ));
        self.state.configs.lock().push(config);
        self.state.created.lock().push(Arc::downgrade(&store));
        store
    }
}

/// One registration as seen by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Singleton(&'static str),
    Factory(&'static str, Lifetime),
}

/// Registry double that records registrations and forwards them to a hub.
#[derive(Default)]
pub struct RecordingRegistry {
    pub hub: ClientHub,
    pub log: Mutex<Vec<Registration>>,
}

impl ComponentRegistry for RecordingRegistry {
    fn register_singleton<T>(&self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.log
            .lock()
            .push(Registration::Singleton(std::any::type_name::<T>()));
        self.hub.register_singleton(component);
    }

    fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        self.log
            .lock()
            .push(Registration::Factory(std::any::type_name::<T>(), lifetime));
        self.hub.register_factory(lifetime, factory);
    }

    fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.hub.contains::<T>()
    }
}
