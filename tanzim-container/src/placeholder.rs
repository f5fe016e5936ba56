//! Forward references used to break dependency cycles.
//!
//! When two providers need each other, one of them is constructed with a
//! [`Deferred`] instead of the finished peer. The container binds the
//! deferred reference exactly once, as soon as the peer exists, and
//! always before the `get` call that started the construction returns.
//!
//! A `Deferred<T>` holds a weak reference: the container that cached the
//! peer stays its only owner, so mutual references never keep each other
//! alive after the owning container closes.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

/// A type-erased instance as stored in container caches.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// The bind-once cell shared by every `Deferred` handed out for one key
/// during one resolution.
#[derive(Clone, Default)]
pub(crate) struct Slot(Arc<OnceCell<Weak<dyn Any + Send + Sync>>>);

impl Slot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds the slot. Returns `false` if it was already bound.
    pub(crate) fn bind(&self, instance: &Instance) -> bool {
        self.0.set(Arc::downgrade(instance)).is_ok()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.0.get().is_some()
    }

    fn upgrade(&self) -> Option<Instance> {
        self.0.get().and_then(Weak::upgrade)
    }

    fn address(&self) -> *const () {
        match self.0.get() {
            Some(weak) => weak.as_ptr() as *const (),
            None => Arc::as_ptr(&self.0) as *const (),
        }
    }
}

/// Reading a [`Deferred`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeferredError {
    /// Read from inside a factory, before the peer was constructed.
    #[error("Deferred<{0}> was read before its target finished construction")]
    Unbound(&'static str),

    /// The container that owned the target has closed and nothing else
    /// keeps the target alive.
    #[error("Deferred<{0}> outlived its target")]
    Released(&'static str),
}

/// A forward reference to a `T` owned by a container.
///
/// Providers receive a `Deferred<T>` for every dependency they declare
/// with `needs_deferred::<T>()`. Store it as a field and read it later
/// with [`get`](Deferred::get) or [`try_get`](Deferred::try_get).
///
/// Equality and hashing follow the identity of the bound instance.
///
/// Calls reach the target through [`get`](Deferred::get), which is the
/// forwarding point. There is no `Deref` impl: the reference is weak, so
/// every access has to upgrade it and can find the target released.
///
/// ```rust
/// use std::sync::Arc;
/// use tanzim_container::prelude::*;
///
/// struct Inbox {
///     outbox: Deferred<Outbox>,
/// }
/// struct Outbox {
///     inbox: Arc<Inbox>,
/// }
///
/// impl Outbox {
///     fn flush(&self) -> usize {
///         3
///     }
/// }
///
/// impl Inbox {
///     fn pending(&self) -> usize {
///         self.outbox.get().map_or(0, |outbox| outbox.flush())
///     }
/// }
///
/// let registry = Registry::builder()
///     .provide(
///         Binding::<Inbox>::new(Scope::App)
///             .needs_deferred::<Outbox>()
///             .to(|args| Ok(Inbox { outbox: args.deferred()? })),
///     )
///     .provide(
///         Binding::<Outbox>::new(Scope::App)
///             .needs::<Inbox>()
///             .to(|args| Ok(Outbox { inbox: args.get()? })),
///     )
///     .build()
///     .unwrap();
///
/// let app = Container::open(registry);
/// let inbox: Arc<Inbox> = app.get().unwrap();
/// assert_eq!(inbox.pending(), 3);
/// app.close().unwrap();
/// ```
pub struct Deferred<T> {
    slot: Slot,
    _target: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    pub(crate) fn from_slot(slot: Slot) -> Self {
        Self { slot, _target: PhantomData }
    }

    /// A deferred reference that is already bound to `instance`.
    pub(crate) fn bound_to(instance: &Instance) -> Self {
        let slot = Slot::new();
        slot.bind(instance);
        Self::from_slot(slot)
    }

    /// Whether the target has been constructed.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.slot.is_bound()
    }

    /// The target, or `None` while unbound or after it was released.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.upgrade().and_then(|instance| instance.downcast::<T>().ok())
    }

    /// Like [`get`](Deferred::get), but says why the target is missing.
    pub fn try_get(&self) -> Result<Arc<T>, DeferredError> {
        if !self.is_bound() {
            return Err(DeferredError::Unbound(type_name::<T>()));
        }
        self.get().ok_or(DeferredError::Released(type_name::<T>()))
    }

    /// Whether this reference points at `instance`.
    pub fn ptr_eq(&self, instance: &Arc<T>) -> bool {
        self.is_bound() && self.slot.address() == Arc::as_ptr(instance) as *const ()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone(), _target: PhantomData }
    }
}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot.address() == other.slot.address()
    }
}

impl<T> Eq for Deferred<T> {}

impl<T> Hash for Deferred<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.address().hash(state);
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("type", &type_name::<T>())
            .field("bound", &self.slot.is_bound())
            .finish()
    }
}
