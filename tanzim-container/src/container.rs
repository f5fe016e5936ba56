//! # The Container
//!
//! A container is bound to one [`Scope`] and caches the instances whose
//! providers are declared at that scope. Inner containers see everything
//! their ancestors cache; ancestors never see into their children.
//!
//! # Architecture
//! ```text
//! RegistryBuilder ──build()──> Registry
//!                                 │
//!                       Container::open()
//!                                 │
//!                                 ▼
//!                     Container (App) ──enter_scope()──> Container (Request)
//!                                                             │
//!                                                          close()
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use tanzim_container::prelude::*;
//!
//! struct Pool;
//! struct Transaction {
//!     pool: Arc<Pool>,
//! }
//!
//! let registry = Registry::builder()
//!     .provide(Binding::<Pool>::new(Scope::App).to(|_| Ok(Pool)))
//!     .provide(
//!         Binding::<Transaction>::new(Scope::Request)
//!             .needs::<Pool>()
//!             .to(|args| Ok(Transaction { pool: args.get()? })),
//!     )
//!     .build()
//!     .expect("valid configuration");
//!
//! let app = Container::open(registry);
//! let request = app.enter_scope().unwrap();
//!
//! let tx: Arc<Transaction> = request.get().unwrap();
//! let pool: Arc<Pool> = app.get().unwrap();
//! assert!(Arc::ptr_eq(&tx.pool, &pool));
//!
//! request.close().unwrap();
//! app.close().unwrap();
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ContainerError, NotRegisteredError, Result, TeardownError};
use crate::key::DependencyKey;
use crate::placeholder::Instance;
use crate::registry::{Provision, Registry};
use crate::resolution::{Built, ResolutionContext};
use crate::scope::Scope;

// ═══════════════════════════════════════════
// Node
// ═══════════════════════════════════════════

#[derive(Default)]
struct Lifecycle {
    closed: bool,
    open_children: usize,
    /// Close as soon as the last child detaches. Set when a handle is
    /// dropped while children are still open.
    close_pending: bool,
}

/// Runtime state of one scope level.
pub(crate) struct Node {
    scope: Scope,
    /// Non-owning: handles keep ancestors alive, not nodes.
    parent: Option<Weak<Node>>,
    cache: DashMap<DependencyKey, Instance>,
    /// Cached instances in construction order, for LIFO teardown.
    created: Mutex<Vec<Built>>,
    /// Held only while building into this node.
    build_lock: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
}

impl Node {
    fn new(scope: Scope, parent: Option<&Arc<Node>>) -> Arc<Node> {
        Arc::new(Node {
            scope,
            parent: parent.map(Arc::downgrade),
            cache: DashMap::new(),
            created: Mutex::new(Vec::new()),
            build_lock: Mutex::new(()),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Attaches a new child node, unless this node is already closed.
    fn child(self: &Arc<Self>, scope: Scope) -> Result<Arc<Node>> {
        let mut state = self.lifecycle.lock();
        if state.closed {
            return Err(ContainerError::ContainerClosed { scope: self.scope });
        }
        state.open_children += 1;
        Ok(Node::new(scope, Some(self)))
    }

    /// Attaches a child to a node created by the same call.
    fn fresh_child(self: &Arc<Self>, scope: Scope) -> Arc<Node> {
        self.lifecycle.lock().open_children += 1;
        Node::new(scope, Some(self))
    }

    pub(crate) fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn cached(&self, key: &DependencyKey) -> Option<Instance> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.lock().closed
    }

    fn mark_close_pending(&self) {
        self.lifecycle.lock().close_pending = true;
    }

    fn commit(&self, built: Built) {
        trace!(key = %built.key, scope = %self.scope, "Caching instance");
        self.cache.insert(built.key, built.instance.clone());
        self.created.lock().push(built);
    }

    fn close(&self) -> Result<()> {
        let created = {
            let _build = self.build_lock.lock();
            let mut state = self.lifecycle.lock();
            if state.open_children > 0 {
                return Err(ContainerError::ChildrenStillOpen {
                    scope: self.scope,
                    open: state.open_children,
                });
            }
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            drop(state);

            self.cache.clear();
            std::mem::take(&mut *self.created.lock())
        };
        debug!(scope = %self.scope, instances = created.len(), "Closing container");

        let mut failures = Vec::new();
        for built in created.into_iter().rev() {
            let Some(hook) = &built.finalizer else { continue };
            trace!(key = %built.key, "Running teardown hook");
            if let Err(err) = hook(&built.instance) {
                error!(key = %built.key, error = %err, "Teardown hook failed");
                failures.push((built.key, err));
            }
        }

        self.detach();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::TeardownFailed(TeardownError { scope: self.scope, failures }))
        }
    }

    fn detach(&self) {
        let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let finish = {
            let mut state = parent.lifecycle.lock();
            state.open_children = state.open_children.saturating_sub(1);
            state.open_children == 0 && state.close_pending
        };
        if finish {
            debug!(scope = %parent.scope, "Last child detached, finishing pending close");
            if let Err(err) = parent.close() {
                error!(scope = %parent.scope, error = %err, "Pending close failed");
            }
        }
    }
}

/// Returns the instance `provision` names, building it into its owning
/// node on a cache miss. `chain` runs from the root to the caller.
///
/// Only the owning node is locked. Dependencies owned by outer nodes are
/// built by nested calls, so locks are always taken from inner levels
/// outward and a node is never locked unless something is built into it.
pub(crate) fn build_into(registry: &Registry, chain: &[Arc<Node>], provision: &Provision) -> Result<Instance> {
    let level = provision.scope.level();
    let Some(owner) = chain.get(level) else {
        return Err(ContainerError::ScopeNotEntered {
            key: provision.key,
            required: provision.scope,
            current: chain.last().map_or(Scope::Runtime, |node| node.scope),
        });
    };

    if let Some(instance) = owner.cached(&provision.key) {
        trace!(key = %provision.key, owner = %owner.scope, "Cache hit");
        return Ok(instance);
    }

    let _build = owner.build_lock.lock();
    if owner.is_closed() {
        return Err(ContainerError::ContainerClosed { scope: owner.scope });
    }
    if let Some(instance) = owner.cached(&provision.key) {
        trace!(key = %provision.key, "Built concurrently by another caller");
        return Ok(instance);
    }

    let mut context = ResolutionContext::new(registry, &chain[..=level]);
    let instance = context.resolve(&provision.key)?;
    for built in context.into_built() {
        owner.commit(built);
    }
    Ok(instance)
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Resolves and caches instances for one scope.
///
/// Open the outermost container with [`Container::open`], enter inner
/// scopes with [`enter_scope`](Container::enter_scope), and call
/// [`close`](Container::close) exactly once per container, inner ones
/// first. A container dropped without `close` closes itself and logs a
/// warning; if inner containers are still open at that point, the close
/// completes when the last of them closes.
pub struct Container {
    registry: Arc<Registry>,
    /// Nodes from the outermost scope down to this container's, indexed
    /// by scope level.
    chain: Vec<Arc<Node>>,
    /// How many trailing nodes of `chain` this handle closes. More than
    /// one when skipped scopes were entered implicitly.
    owned: usize,
}

impl Container {
    /// Opens the root container at [`Scope::App`]. The skipped
    /// [`Scope::Runtime`] level is opened implicitly and closed with it.
    pub fn open(registry: impl Into<Arc<Registry>>) -> Container {
        Self::open_at(registry, Scope::App)
    }

    /// Opens a root container at `scope`, with implicit containers for
    /// every outer level.
    pub fn open_at(registry: impl Into<Arc<Registry>>, scope: Scope) -> Container {
        let mut chain: Vec<Arc<Node>> = Vec::with_capacity(scope.level() + 1);
        for level in &Scope::ALL[..=scope.level()] {
            let node = match chain.last() {
                Some(parent) => parent.fresh_child(*level),
                None => Node::new(*level, None),
            };
            chain.push(node);
        }

        info!(scope = %scope, "Opened root container");
        Container {
            registry: registry.into(),
            owned: chain.len(),
            chain,
        }
    }

    fn node(&self) -> &Node {
        &self.chain[self.chain.len() - 1]
    }

    pub fn scope(&self) -> Scope {
        self.node().scope
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.node().is_closed()
    }

    /// Number of instances this container has cached.
    pub fn cached_len(&self) -> usize {
        self.node().cache.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ContainerError::ContainerClosed { scope: self.scope() });
        }
        Ok(())
    }

    /// Enters the next inner scope, passing through skipped levels.
    ///
    /// # Errors
    /// [`ContainerError::NoInnerScope`] from [`Scope::Step`],
    /// [`ContainerError::ContainerClosed`] if this container is closed.
    pub fn enter_scope(&self) -> Result<Container> {
        let path = self
            .scope()
            .entry_path()
            .ok_or(ContainerError::NoInnerScope { current: self.scope() })?;
        self.enter_path(path)
    }

    /// Enters `target` directly, including skipped levels.
    pub fn enter_scope_to(&self, target: Scope) -> Result<Container> {
        let path = self.scope().path_to(target).ok_or(ContainerError::InvalidScopeTarget {
            current: self.scope(),
            target,
        })?;
        self.enter_path(path)
    }

    fn enter_path(&self, path: Vec<Scope>) -> Result<Container> {
        let mut chain = self.chain.clone();
        for (i, scope) in path.iter().enumerate() {
            let parent = &chain[chain.len() - 1];
            let node = if i == 0 { parent.child(*scope)? } else { parent.fresh_child(*scope) };
            chain.push(node);
        }

        let child = Container {
            registry: self.registry.clone(),
            owned: path.len(),
            chain,
        };
        debug!(from = %self.scope(), to = %child.scope(), implicit = path.len() - 1, "Entered scope");
        Ok(child)
    }

    /// Runs `f` inside a fresh inner scope and closes it on every exit
    /// path. If both `f` and `close` fail, the error from `f` wins.
    pub fn scoped<R, E>(&self, f: impl FnOnce(&Container) -> std::result::Result<R, E>) -> std::result::Result<R, E>
    where
        E: From<ContainerError>,
    {
        let child = self.enter_scope()?;
        let outcome = f(&child);
        let closed = child.close();

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                error!(error = %close_err, "Closing scope failed after the scoped call failed");
                Err(err)
            }
        }
    }

    /// Resolves the unnamed provider of `T`.
    ///
    /// Instances are built at most once per owning container; every
    /// descendant gets the same `Arc`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_key(DependencyKey::of::<T>())
    }

    /// Resolves the provider of `T` registered under `name`.
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        self.get_key(DependencyKey::named::<T>(name))
    }

    fn get_key<T: Send + Sync + 'static>(&self, key: DependencyKey) -> Result<Arc<T>> {
        trace!(key = %key, scope = %self.scope(), "Resolving");
        let instance = self.resolve_key(&key)?;
        instance.downcast::<T>().map_err(|_| ContainerError::FactoryFailed {
            key,
            source: format!("Type mismatch: expected {}", type_name::<T>()).into(),
        })
    }

    fn resolve_key(&self, key: &DependencyKey) -> Result<Instance> {
        self.ensure_open()?;

        let provision = self.registry.lookup(key).ok_or_else(|| {
            ContainerError::NotRegistered(NotRegisteredError::new(*key, None, self.registry.keys()))
        })?;
        build_into(&self.registry, &self.chain, provision)
    }

    /// Runs teardown hooks of every instance this container cached, most
    /// recently built first, then detaches from the parent.
    ///
    /// Every hook runs even if some fail; failures are reported together.
    ///
    /// # Errors
    /// - [`ContainerError::ChildrenStillOpen`] if an inner container is
    ///   still open. Nothing is torn down.
    /// - [`ContainerError::TeardownFailed`] if any hook failed.
    pub fn close(&self) -> Result<()> {
        let mut first_error = None;

        for node in self.chain.iter().rev().take(self.owned) {
            match node.close() {
                Ok(()) => {}
                Err(err @ ContainerError::ChildrenStillOpen { .. }) => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        warn!(scope = %self.scope(), "Container dropped without close()");
        // Children may outlive this handle; the last one to detach finishes the close.
        for node in self.chain.iter().rev().take(self.owned) {
            node.mark_close_pending();
        }
        match self.close() {
            Ok(()) => {}
            Err(ContainerError::ChildrenStillOpen { scope, open }) => {
                debug!(scope = %scope, open, "Close deferred until children detach");
            }
            Err(err) => error!(scope = %self.scope(), error = %err, "Closing dropped container failed"),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("scope", &self.scope())
            .field("cached", &self.cached_len())
            .field("registered", &self.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::Container;
    pub use crate::error::{BoxError, ContainerError, Result};
    pub use crate::key::DependencyKey;
    pub use crate::placeholder::Deferred;
    pub use crate::provider::{Binding, Edge, Provider, ProviderRegistry, Registration};
    pub use crate::registry::{Registry, RegistryBuilder};
    pub use crate::resolution::Arguments;
    pub use crate::scope::Scope;
    pub use crate::settings::Settings;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
