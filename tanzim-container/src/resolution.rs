//! Per-call resolution state and the cycle resolver.
//!
//! A [`ResolutionContext`] builds into exactly one container node for one
//! call and is never shared. Dependencies owned by outer containers are
//! resolved through those containers, each under its own build lock. It
//! tracks:
//! - the stack of providers under construction on the current path,
//! - one placeholder [`Slot`] per key that was handed out deferred,
//! - instances built during the call, staged until the call succeeds,
//! - deferred dependencies postponed until the current construction
//!   finishes.
//!
//! # Breaking cycles
//! Given `A` that stores a `Deferred<B>` and `B` that needs `A`, both in
//! one cycle, `get::<A>()` runs:
//!
//! ```text
//! construct A   B is a cyclic deferred edge: postpone it, pass slot(B)
//! A built       stage A
//! drain         construct B with the staged A, bind slot(B) to B
//! commit        cache A then B in the owning container
//! ```
//!
//! An eager edge that walks back into a provider still on the stack is an
//! unbindable cycle and fails the call. Nothing the failed call built into
//! its own container is cached.

use std::any::type_name;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::container::{Node, build_into};
use crate::error::{ContainerError, CycleHop, NotRegisteredError, Result, UnbindableCycleError};
use crate::key::DependencyKey;
use crate::placeholder::{Deferred, Instance, Slot};
use crate::provider::{Edge, FinalizerFn};
use crate::registry::{Provision, Registry, ResolvedDependency};
use crate::scope::Scope;

/// A dependency value as handed to a factory.
enum Resolved {
    Ready(Instance),
    Pending(Slot),
}

struct Argument {
    /// The key the provider declared.
    key: DependencyKey,
    scope: Scope,
    value: Resolved,
}

/// The dependencies a factory receives, keyed by what it declared.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use tanzim_container::prelude::*;
///
/// struct Clock;
/// struct Audit { clock: Arc<Clock>, peer: Deferred<Audit> }
///
/// let binding = Binding::<Audit>::new(Scope::App)
///     .needs::<Clock>()
///     .needs_deferred::<Audit>()
///     .to(|args| {
///         Ok(Audit {
///             clock: args.get()?,
///             peer: args.deferred()?,
///         })
///     });
/// # let _ = binding;
/// ```
pub struct Arguments<'a> {
    consumer: DependencyKey,
    consumer_scope: Scope,
    values: &'a [Argument],
}

impl Arguments<'_> {
    /// The key being constructed.
    pub fn consumer(&self) -> &DependencyKey {
        &self.consumer
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The finished instance of an eager (or already built deferred)
    /// dependency on `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.instance(DependencyKey::of::<T>())
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        self.instance(DependencyKey::named::<T>(name))
    }

    /// A forward reference to `T`, bound before the outer `get` returns.
    pub fn deferred<T: Send + Sync + 'static>(&self) -> Result<Deferred<T>> {
        self.forward(DependencyKey::of::<T>())
    }

    pub fn deferred_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Deferred<T>> {
        self.forward(DependencyKey::named::<T>(name))
    }

    fn argument(&self, key: DependencyKey) -> Result<&Argument> {
        self.values
            .iter()
            .find(|argument| argument.key == key)
            .ok_or(ContainerError::UndeclaredDependency {
                consumer: self.consumer,
                dependency: key,
            })
    }

    fn instance<T: Send + Sync + 'static>(&self, key: DependencyKey) -> Result<Arc<T>> {
        let argument = self.argument(key)?;
        match &argument.value {
            Resolved::Ready(instance) => instance.clone().downcast::<T>().map_err(|_| {
                ContainerError::FactoryFailed {
                    key,
                    source: format!("Type mismatch: expected {}", type_name::<T>()).into(),
                }
            }),
            // The peer is still waiting on this factory.
            Resolved::Pending(_) => {
                let consumer = CycleHop {
                    key: self.consumer,
                    scope: self.consumer_scope,
                    deferred: true,
                };
                Err(ContainerError::UnbindableCycle(UnbindableCycleError {
                    path: vec![
                        consumer.clone(),
                        CycleHop { key, scope: argument.scope, deferred: false },
                        consumer,
                    ],
                }))
            }
        }
    }

    fn forward<T: Send + Sync + 'static>(&self, key: DependencyKey) -> Result<Deferred<T>> {
        Ok(match &self.argument(key)?.value {
            Resolved::Ready(instance) => Deferred::bound_to(instance),
            Resolved::Pending(slot) => Deferred::from_slot(slot.clone()),
        })
    }
}

/// An instance built during a call, waiting to be committed.
pub(crate) struct Built {
    pub key: DependencyKey,
    pub instance: Instance,
    pub finalizer: Option<FinalizerFn>,
}

struct Frame {
    key: DependencyKey,
    scope: Scope,
    /// Kind of the edge currently being followed out of this frame.
    via: Edge,
}

pub(crate) struct ResolutionContext<'a> {
    registry: &'a Registry,
    /// Nodes from the root down to the one this call builds into, indexed
    /// by scope level.
    chain: &'a [Arc<Node>],
    stack: Vec<Frame>,
    slots: HashMap<DependencyKey, Slot>,
    staged: HashMap<DependencyKey, Instance>,
    built: Vec<Built>,
    postponed: VecDeque<DependencyKey>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(registry: &'a Registry, chain: &'a [Arc<Node>]) -> Self {
        Self {
            registry,
            chain,
            stack: Vec::new(),
            slots: HashMap::new(),
            staged: HashMap::new(),
            built: Vec::new(),
            postponed: VecDeque::new(),
        }
    }

    /// Resolves `key` and everything postponed on the way. On success
    /// every slot handed out during the call is bound.
    pub fn resolve(&mut self, key: &DependencyKey) -> Result<Instance> {
        let instance = self.instance(key)?;

        while let Some(next) = self.postponed.pop_front() {
            let peer = self.instance(&next)?;
            if let Some(slot) = self.slots.get(&next) {
                slot.bind(&peer);
            }
        }

        debug_assert!(self.slots.values().all(Slot::is_bound));
        debug!(built = self.built.len(), placeholders = self.slots.len(), "Resolution finished");
        Ok(instance)
    }

    /// Instances built by the call, in construction order.
    pub fn into_built(self) -> Vec<Built> {
        self.built
    }

    fn provision(&self, key: &DependencyKey) -> Result<&'a Provision> {
        let registry = self.registry;
        registry.lookup(key).ok_or_else(|| {
            ContainerError::NotRegistered(NotRegisteredError::new(
                *key,
                self.stack.last().map(|frame| frame.key),
                registry.keys(),
            ))
        })
    }

    /// Whether `provision` is built into this call's own node. Anything
    /// else is resolved through its owning node.
    fn owns(&self, provision: &Provision) -> bool {
        provision.scope.level() + 1 == self.chain.len()
    }

    /// Staged by this call, or cached by the owning container.
    fn existing(&self, provision: &Provision) -> Option<Instance> {
        if let Some(instance) = self.staged.get(&provision.key) {
            return Some(instance.clone());
        }
        self.chain.last().and_then(|owner| owner.cached(&provision.key))
    }

    fn instance(&mut self, key: &DependencyKey) -> Result<Instance> {
        let provision = self.provision(key)?;
        if !self.owns(provision) {
            return build_into(self.registry, self.chain, provision);
        }
        match self.existing(provision) {
            Some(instance) => Ok(instance),
            None => self.construct(provision),
        }
    }

    fn slot(&mut self, key: DependencyKey) -> Slot {
        self.slots.entry(key).or_default().clone()
    }

    fn dependency(&mut self, dep: &ResolvedDependency) -> Result<Argument> {
        let provision = self.provision(&dep.key)?;
        let value = self.dependency_value(dep, provision)?;
        Ok(Argument { key: dep.requested, scope: provision.scope, value })
    }

    fn dependency_value(
        &mut self,
        dep: &ResolvedDependency,
        provision: &'a Provision,
    ) -> Result<Resolved> {
        if !self.owns(provision) {
            trace!(key = %dep.key, owner = %provision.scope, "Resolving through outer container");
            return build_into(self.registry, self.chain, provision).map(Resolved::Ready);
        }
        if let Some(instance) = self.existing(provision) {
            return Ok(Resolved::Ready(instance));
        }

        if dep.edge == Edge::Deferred && dep.cyclic {
            trace!(key = %dep.key, "Postponing cyclic dependency");
            self.postponed.push_back(dep.key);
            return Ok(Resolved::Pending(self.slot(dep.key)));
        }

        if let Some(start) = self.stack.iter().position(|frame| frame.key == dep.key) {
            return match dep.edge {
                Edge::Deferred => Ok(Resolved::Pending(self.slot(dep.key))),
                Edge::Eager => Err(self.unbindable(start)),
            };
        }

        self.construct(provision).map(Resolved::Ready)
    }

    fn unbindable(&self, start: usize) -> ContainerError {
        let mut path: Vec<CycleHop> = self.stack[start..]
            .iter()
            .map(|frame| CycleHop {
                key: frame.key,
                scope: frame.scope,
                deferred: frame.via == Edge::Deferred,
            })
            .collect();
        if let Some(first) = path.first().cloned() {
            path.push(CycleHop { deferred: false, ..first });
        }
        ContainerError::UnbindableCycle(UnbindableCycleError { path })
    }

    fn construct(&mut self, provision: &'a Provision) -> Result<Instance> {
        trace!(key = %provision.key, scope = %provision.scope, "Constructing");
        self.stack.push(Frame {
            key: provision.key,
            scope: provision.scope,
            via: Edge::Eager,
        });

        let mut values = Vec::with_capacity(provision.dependencies.len());
        for dep in &provision.dependencies {
            if let Some(frame) = self.stack.last_mut() {
                frame.via = dep.edge;
            }
            values.push(self.dependency(dep)?);
        }
        self.stack.pop();

        let args = Arguments {
            consumer: provision.key,
            consumer_scope: provision.scope,
            values: &values,
        };
        let instance = (provision.factory)(&args).map_err(|source| {
            match source.downcast::<ContainerError>() {
                Ok(inner) => *inner,
                Err(source) => ContainerError::FactoryFailed { key: provision.key, source },
            }
        })?;

        if let Some(slot) = self.slots.get(&provision.key) {
            if slot.bind(&instance) {
                trace!(key = %provision.key, "Bound placeholder");
            }
        }

        self.staged.insert(provision.key, instance.clone());
        self.built.push(Built {
            key: provision.key,
            instance: instance.clone(),
            finalizer: provision.finalizer.clone(),
        });
        Ok(instance)
    }
}
