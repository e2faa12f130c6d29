//! Minimalistic, type-safe component registry.
//!
//! Design goals:
//! - Providers register a component once, either as a ready instance or as a factory.
//! - Consumers fetch by *interface type* (trait object or concrete type) without knowing
//!   how the component was built.
//! - Factories carry a [`Lifetime`]: singletons are built on first resolution and cached,
//!   per-call factories build a fresh value on every resolution.
//!
//! Implementation details:
//! - Key = type name. We use `type_name::<T>()`, which works for `T = dyn Trait`.
//! - Value = `Arc<T>` stored as `Box<dyn Any + Send + Sync>` (downcast on read).
//! - Sync hot path: `get()` is non-async and only takes the read lock.
//!
//! Notes:
//! - Re-registering overwrites the previous entry; existing `Arc`s held by consumers remain valid.
//! - `contains` followed by `register_*` is not atomic. Callers that need check-then-register
//!   semantics across threads must serialize those calls themselves.

use parking_lot::RwLock;
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
};

/// Stable type key for components. Uses fully-qualified `type_name::<T>()`.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct TypeKey(&'static str);

impl TypeKey {
    #[inline]
    fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(std::any::type_name::<T>())
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// How long a factory-built component lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Built once on first resolution, then shared for the life of the hub.
    Singleton,
    /// Built fresh on every resolution.
    PerCall,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientHubError {
    #[error("component not found: type={type_key:?}")]
    NotFound { type_key: TypeKey },

    #[error("type mismatch in hub for type={type_key:?}")]
    TypeMismatch { type_key: TypeKey },
}

type Boxed = Box<dyn Any + Send + Sync>;
type MakeFn = Box<dyn Fn() -> Boxed + Send + Sync>;

enum Entry {
    Instance(Boxed),
    Factory {
        lifetime: Lifetime,
        make: MakeFn,
        cached: OnceLock<Boxed>,
    },
}

impl Entry {
    fn lifetime(&self) -> Lifetime {
        match self {
            Entry::Instance(_) => Lifetime::Singleton,
            Entry::Factory { lifetime, .. } => *lifetime,
        }
    }
}

/// Type-safe registry of components keyed by interface type.
pub struct ClientHub {
    map: RwLock<HashMap<TypeKey, Entry>>,
}

impl ClientHub {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.map.read();
        f.debug_map()
            .entries(r.iter().map(|(k, v)| (k, v.lifetime())))
            .finish()
    }
}

impl ClientHub {
    /// Register a ready-made component under the interface type `T`.
    /// `T` can be a trait object like `dyn my_crate::DocumentStore`.
    pub fn register_singleton<T>(&self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        tracing::trace!(component = std::any::type_name::<T>(), "registering singleton");
        self.map
            .write()
            .insert(TypeKey::of::<T>(), Entry::Instance(Box::new(component)));
    }

    /// Register a factory for `T` with the given lifetime.
    pub fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        tracing::trace!(
            component = std::any::type_name::<T>(),
            ?lifetime,
            "registering factory"
        );
        let make: MakeFn = Box::new(move || Box::new(factory()) as Boxed);
        self.map.write().insert(
            TypeKey::of::<T>(),
            Entry::Factory {
                lifetime,
                make,
                cached: OnceLock::new(),
            },
        );
    }

    /// Resolve a component by interface type `T`.
    ///
    /// # Errors
    /// Returns `ClientHubError::NotFound` when nothing is registered for `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, ClientHubError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_key = TypeKey::of::<T>();
        let r = self.map.read();

        let entry = r.get(&type_key).ok_or_else(|| ClientHubError::NotFound {
            type_key: type_key.clone(),
        })?;

        let fresh;
        let boxed: &Boxed = match entry {
            Entry::Instance(b) => b,
            Entry::Factory {
                lifetime: Lifetime::Singleton,
                make,
                cached,
            } => cached.get_or_init(make),
            Entry::Factory {
                lifetime: Lifetime::PerCall,
                make,
                ..
            } => {
                fresh = make();
                &fresh
            }
        };

        // Stored value is exactly `Arc<T>`; downcast is safe and cheap.
        boxed
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(ClientHubError::TypeMismatch { type_key })
    }

    /// Whether anything (instance or factory) is registered for `T`.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.map.read().contains_key(&TypeKey::of::<T>())
    }

    /// Lifetime of the registration for `T`, if any.
    #[must_use]
    pub fn lifetime_of<T>(&self) -> Option<Lifetime>
    where
        T: ?Sized + 'static,
    {
        self.map.read().get(&TypeKey::of::<T>()).map(Entry::lifetime)
    }

    /// Remove the registration for `T`; returns whether one was present.
    pub fn remove<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.map.write().remove(&TypeKey::of::<T>()).is_some()
    }

    /// Clear everything (useful in tests).
    pub fn clear(&self) {
        self.map.write().clear();
    }

    /// Introspection: (total entries).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the hub is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

/// Narrow registration interface used by bootstrap code.
///
/// Keeping bootstrappers generic over this trait lets them run against a
/// [`ClientHub`] in production and a recording double in tests.
pub trait ComponentRegistry {
    fn register_singleton<T>(&self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static;

    fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static;

    fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + 'static;
}

impl ComponentRegistry for ClientHub {
    fn register_singleton<T>(&self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ClientHub::register_singleton(self, component);
    }

    fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        ClientHub::register_factory(self, lifetime, factory);
    }

    fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.contains::<T>()
    }
}
