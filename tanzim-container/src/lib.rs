//! Core container implementation for Tanzim.
//!
//! Providers are collected into a [`Registry`] once at startup. Each
//! [`Container`] is bound to a [`Scope`] and caches what its scope owns.

pub mod container;
pub mod error;
pub(crate) mod graph;
pub mod key;
pub mod placeholder;
pub mod provider;
pub mod registry;
pub mod resolution;
pub mod scope;
pub mod settings;

pub use container::{Container, prelude};
pub use error::{BoxError, ContainerError, Result};
pub use key::DependencyKey;
pub use placeholder::Deferred;
pub use provider::{Binding, Provider, ProviderRegistry};
pub use registry::{Registry, RegistryBuilder};
pub use scope::Scope;
pub use settings::Settings;
