//! Lifetime-aware service resolution.
//!
//! The dispatch engine never constructs handlers or middlewares itself; it
//! asks a [`ServiceScope`] for an instance and the scope applies the
//! registered [`Lifetime`]. [`ServiceCollection`] accumulates typed factories,
//! [`ServiceProvider`] owns the finalized registrations plus the singleton
//! cache, and each dispatch scope gets its own [`ServiceScope`] with a scoped
//! cache.
//!
//! The lifetime contract fixes instance identity only: a transient resolution
//! constructs on every call, a scoped resolution yields one instance per
//! scope, a singleton yields one instance per provider. Thread safety of
//! whatever state those instances keep is the implementer's concern.
//!
//! # Example
//!
//! ```
//! use hermes_core::{Lifetime, ServiceCollection};
//!
//! struct Clock;
//!
//! let mut services = ServiceCollection::new();
//! services.register::<Clock, _>(Lifetime::Singleton, |_| Ok(Clock));
//! let provider = services.build();
//! let scope = provider.create_scope();
//! let clock = scope.resolve::<Clock>()?;
//! # let _ = clock;
//! # Ok::<(), hermes_core::ResolveError>(())
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// How long a resolved instance lives relative to the resolution scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// A new instance per resolution call.
    Transient,
    /// One instance per [`ServiceScope`], shared by every resolution in it.
    Scoped,
    /// One instance per [`ServiceProvider`], shared across all scopes.
    Singleton,
}

impl Lifetime {
    /// Lowercase label for log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Scoped => "scoped",
            Self::Singleton => "singleton",
        }
    }
}

/// Error returned when a service cannot be resolved.
#[derive(Debug, Clone)]
pub struct ResolveError {
    type_name: &'static str,
    reason: String,
}

impl ResolveError {
    /// Creates an error for a type that was never registered.
    #[must_use]
    pub fn not_registered<T>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: "type is not registered".to_string(),
        }
    }

    /// Creates an error for a factory that failed with the given reason.
    #[must_use]
    pub fn factory_failed<T>(reason: impl Into<String>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// The fully qualified name of the type that failed to resolve.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Human-readable failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to resolve `{}`: {}", self.type_name, self.reason)
    }
}

impl std::error::Error for ResolveError {}

type ErasedInstance = Arc<dyn Any + Send + Sync>;
type ErasedFactory =
    Arc<dyn Fn(&ServiceScope) -> Result<ErasedInstance, ResolveError> + Send + Sync>;

struct ServiceRegistration {
    lifetime: Lifetime,
    factory: ErasedFactory,
}

/// Accumulates service registrations before the provider is built.
///
/// Registering the same type twice replaces the earlier registration.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, ServiceRegistration>,
}

impl ServiceCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `T` under the given lifetime.
    ///
    /// The factory receives the resolving scope, so it can resolve its own
    /// dependencies from the same scope.
    pub fn register<T, F>(&mut self, lifetime: Lifetime, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        let erased: ErasedFactory =
            Arc::new(move |scope| factory(scope).map(|value| Arc::new(value) as ErasedInstance));
        self.registrations
            .insert(TypeId::of::<T>(), ServiceRegistration { lifetime, factory: erased });
    }

    /// Registers an already constructed instance as a singleton.
    pub fn register_instance<T>(&mut self, instance: T)
    where
        T: Send + Sync + 'static,
    {
        let instance: ErasedInstance = Arc::new(instance);
        let erased: ErasedFactory = Arc::new(move |_| Ok(instance.clone()));
        self.registrations.insert(
            TypeId::of::<T>(),
            ServiceRegistration { lifetime: Lifetime::Singleton, factory: erased },
        );
    }

    /// Returns true if `T` has a registration.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Finalizes the collection into a provider.
    #[must_use]
    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                registrations: self.registrations,
                singletons: Mutex::new(HashMap::new()),
            }),
        }
    }
}

struct ProviderInner {
    registrations: HashMap<TypeId, ServiceRegistration>,
    singletons: Mutex<HashMap<TypeId, ErasedInstance>>,
}

/// Finalized service registrations plus the singleton cache.
///
/// Cheap to clone; all clones share registrations and singletons.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Opens a new resolution scope with an empty scoped cache.
    #[must_use]
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            provider: Arc::clone(&self.inner),
            scoped: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.inner.registrations.len())
            .finish_non_exhaustive()
    }
}

/// One resolution scope.
///
/// Clones share the scoped cache, so a scope handle can be passed into
/// factories and across await points freely.
#[derive(Clone)]
pub struct ServiceScope {
    provider: Arc<ProviderInner>,
    scoped: Arc<Mutex<HashMap<TypeId, ErasedInstance>>>,
}

impl ServiceScope {
    /// Resolves an instance of `T` according to its registered lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if `T` was never registered or its factory
    /// fails.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ResolveError>
    where
        T: Send + Sync + 'static,
    {
        let registration = self
            .provider
            .registrations
            .get(&TypeId::of::<T>())
            .ok_or_else(ResolveError::not_registered::<T>)?;

        let instance = match registration.lifetime {
            Lifetime::Transient => (registration.factory)(self)?,
            Lifetime::Scoped => {
                self.resolve_cached::<T>(&self.scoped, &registration.factory)?
            }
            Lifetime::Singleton => {
                self.resolve_cached::<T>(&self.provider.singletons, &registration.factory)?
            }
        };

        downcast_instance::<T>(instance)
    }

    /// Returns true if `T` has a registration visible to this scope.
    #[must_use]
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.provider.registrations.contains_key(&TypeId::of::<T>())
    }

    // Caches never hold their lock across a factory call, so factories may
    // re-enter the scope to resolve their own dependencies. Under concurrent
    // first resolution the instance that lands in the cache first wins and
    // later builds are discarded, keeping identity stable for the lifetime.
    fn resolve_cached<T: 'static>(
        &self,
        cache: &Mutex<HashMap<TypeId, ErasedInstance>>,
        factory: &ErasedFactory,
    ) -> Result<ErasedInstance, ResolveError> {
        let key = TypeId::of::<T>();
        if let Some(existing) = cache.lock().get(&key) {
            return Ok(existing.clone());
        }

        let built = factory(self)?;

        let mut cache = cache.lock();
        let entry = cache.entry(key).or_insert(built);
        Ok(entry.clone())
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope").finish_non_exhaustive()
    }
}

fn downcast_instance<T: Send + Sync + 'static>(
    instance: ErasedInstance,
) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast::<T>()
        .map_err(|_| ResolveError::factory_failed::<T>("registered factory produced a different type"))
}
