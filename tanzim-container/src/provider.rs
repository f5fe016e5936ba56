//! Registration building blocks.
//!
//! A [`Binding`] describes how to build one type: its scope, the
//! dependencies its factory receives and an optional teardown hook. It
//! produces a type-erased [`Registration`] for the registry.
//!
//! A [`Provider`] groups related registrations, the way an application
//! splits wiring by domain:
//!
//! ```rust
//! use std::sync::Arc;
//! use tanzim_container::prelude::*;
//!
//! struct Pool;
//! struct Repository {
//!     pool: Arc<Pool>,
//! }
//!
//! struct StorageProvider;
//!
//! impl Provider for StorageProvider {
//!     fn register(&self, registry: &mut dyn ProviderRegistry) {
//!         registry.add(Binding::<Pool>::new(Scope::App).to(|_| Ok(Pool)));
//!         registry.add(
//!             Binding::<Repository>::new(Scope::Request)
//!                 .needs::<Pool>()
//!                 .to(|args| Ok(Repository { pool: args.get()? })),
//!         );
//!     }
//! }
//!
//! let registry = Registry::builder().add_provider(&StorageProvider).build().unwrap();
//! assert_eq!(registry.len(), 2);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::BoxError;
use crate::key::DependencyKey;
use crate::placeholder::Instance;
use crate::resolution::Arguments;
use crate::scope::Scope;

pub(crate) type FactoryFn = Arc<dyn Fn(&Arguments<'_>) -> Result<Instance, BoxError> + Send + Sync>;
pub(crate) type FinalizerFn = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// How a factory receives one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// The factory needs the finished instance (`Arc<T>`).
    Eager,
    /// The factory stores a [`Deferred<T>`](crate::placeholder::Deferred)
    /// that may be bound after it runs.
    Deferred,
}

/// One declared dependency of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub key: DependencyKey,
    pub edge: Edge,
}

/// A type-erased provider, ready to be added to a registry.
#[derive(Clone)]
pub struct Registration {
    pub(crate) key: DependencyKey,
    pub(crate) scope: Scope,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) factory: FactoryFn,
    pub(crate) finalizer: Option<FinalizerFn>,
}

impl Registration {
    pub fn key(&self) -> &DependencyKey {
        &self.key
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn has_teardown(&self) -> bool {
        self.finalizer.is_some()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("teardown", &self.finalizer.is_some())
            .finish()
    }
}

/// Typed builder for a [`Registration`] of `T`.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use tanzim_container::prelude::*;
///
/// struct Config { url: String }
/// struct Client { config: Arc<Config> }
///
/// let registration = Binding::<Client>::new(Scope::App)
///     .needs::<Config>()
///     .on_close(|_client| Ok(()))
///     .to(|args| Ok(Client { config: args.get()? }));
///
/// assert_eq!(registration.scope(), Scope::App);
/// assert_eq!(registration.dependencies().len(), 1);
/// assert!(registration.has_teardown());
/// ```
pub struct Binding<T> {
    key: DependencyKey,
    scope: Scope,
    dependencies: Vec<Dependency>,
    finalizer: Option<FinalizerFn>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Binding<T> {
    /// Binds the unnamed key of `T` at `scope`.
    pub fn new(scope: Scope) -> Self {
        Self::for_key(DependencyKey::of::<T>(), scope)
    }

    /// Binds `T` under `name` at `scope`.
    pub fn named(name: &'static str, scope: Scope) -> Self {
        Self::for_key(DependencyKey::named::<T>(name), scope)
    }

    fn for_key(key: DependencyKey, scope: Scope) -> Self {
        Self {
            key,
            scope,
            dependencies: Vec::new(),
            finalizer: None,
            _target: PhantomData,
        }
    }

    /// Declares an eager dependency on `D`; read it with `args.get::<D>()`.
    pub fn needs<D: Send + Sync + 'static>(self) -> Self {
        self.dependency(DependencyKey::of::<D>(), Edge::Eager)
    }

    pub fn needs_named<D: Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.dependency(DependencyKey::named::<D>(name), Edge::Eager)
    }

    /// Declares a deferred dependency on `D`; read it with
    /// `args.deferred::<D>()`. Only deferred edges can break a cycle.
    pub fn needs_deferred<D: Send + Sync + 'static>(self) -> Self {
        self.dependency(DependencyKey::of::<D>(), Edge::Deferred)
    }

    pub fn needs_deferred_named<D: Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.dependency(DependencyKey::named::<D>(name), Edge::Deferred)
    }

    fn dependency(mut self, key: DependencyKey, edge: Edge) -> Self {
        self.dependencies.push(Dependency { key, edge });
        self
    }

    /// Runs `hook` on the instance when its owning container closes.
    pub fn on_close(
        mut self,
        hook: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.finalizer = Some(Arc::new(move |instance: &Instance| {
            match instance.downcast_ref::<T>() {
                Some(typed) => hook(typed),
                None => Ok(()),
            }
        }));
        self
    }

    /// Finishes the binding with a factory.
    pub fn to(
        self,
        factory: impl Fn(&Arguments<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Registration {
        self.finish(Arc::new(move |args: &Arguments<'_>| {
            Ok(Arc::new(factory(args)?) as Arc<dyn Any + Send + Sync>)
        }))
    }

    /// Finishes the binding with a pre-built value shared by every
    /// container that caches it.
    pub fn to_value(self, value: T) -> Registration {
        let instance: Instance = Arc::new(value);
        self.finish(Arc::new(move |_: &Arguments<'_>| Ok(instance.clone())))
    }

    fn finish(self, factory: FactoryFn) -> Registration {
        Registration {
            key: self.key,
            scope: self.scope,
            dependencies: self.dependencies,
            factory,
            finalizer: self.finalizer,
        }
    }
}

/// A module that registers related providers.
///
/// Split wiring by concern instead of one giant registration block:
///
/// ```rust,ignore
/// let registry = Registry::builder()
///     .add_provider(&StorageProvider)
///     .add_provider(&MailProvider)
///     .build()?;
/// ```
pub trait Provider: Send + Sync {
    /// Adds this module's registrations. Called once per registry build.
    fn register(&self, registry: &mut dyn ProviderRegistry);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The part of the registry builder a [`Provider`] can use.
///
/// Kept separate from `RegistryBuilder` so providers can be tested
/// against a recording mock.
pub trait ProviderRegistry {
    fn add(&mut self, registration: Registration);

    /// Makes `alias` resolve through `target`'s provider.
    fn add_alias(&mut self, alias: DependencyKey, target: DependencyKey);
}
