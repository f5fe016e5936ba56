//! Dependency identification keys.
//!
//! A [`DependencyKey`] is what providers are registered under and what
//! `Container::get` looks up: a Rust type plus an optional name, so
//! several providers of the same type can coexist.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use tanzim_support::rendering::shorten_type_name;

/// Identifies one provider in a registry.
///
/// # Examples
/// ```
/// use tanzim_container::key::DependencyKey;
///
/// let plain = DependencyKey::of::<String>();
/// assert_eq!(plain.name(), None);
///
/// let primary = DependencyKey::named::<String>("primary_db");
/// assert_eq!(primary.name(), Some("primary_db"));
/// assert_ne!(plain, primary);
/// assert!(plain.same_type(&primary));
/// ```
#[derive(Clone, Copy)]
pub struct DependencyKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl DependencyKey {
    /// Key for the unnamed provider of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Key for the provider of `T` registered under `name`.
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::of::<T>()
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name, as reported by [`std::any::type_name`].
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Whether both keys describe the same Rust type, ignoring names.
    #[inline]
    pub fn same_type(&self, other: &DependencyKey) -> bool {
        self.type_id == other.type_id
    }

    /// Type name without module paths, for compact diagnostics.
    pub fn short_name(&self) -> String {
        match self.name {
            Some(name) => format!("{}#{name}", shorten_type_name(self.type_name)),
            None => shorten_type_name(self.type_name),
        }
    }
}

impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for DependencyKey {}

impl Hash for DependencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "DependencyKey({}, name={name:?})", self.type_name),
            None => write!(f, "DependencyKey({})", self.type_name),
        }
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} (name={name:?})", self.type_name),
            None => f.write_str(self.type_name),
        }
    }
}
