//! # Tanzim: scoped dependency injection for Rust
//!
//! Register providers once, open a container per scope, and let the
//! container build each dependency at most once per owning scope.
//! Cycles through a [`Deferred`] edge are resolved with placeholders
//! that bind once the dependency exists.
//!
//! ```rust
//! use std::sync::Arc;
//! use tanzim::prelude::*;
//!
//! struct Settings {
//!     greeting: &'static str,
//! }
//!
//! struct Greeter {
//!     settings: Arc<Settings>,
//! }
//!
//! let registry = Registry::builder()
//!     .value(Scope::App, Settings { greeting: "salaam" })
//!     .provide(
//!         Binding::<Greeter>::new(Scope::Request)
//!             .needs::<Settings>()
//!             .to(|args| Ok(Greeter { settings: args.get()? })),
//!     )
//!     .build()
//!     .expect("valid configuration");
//!
//! let app = Container::open(registry);
//! let greeting = app
//!     .scoped(|request| {
//!         let greeter: Arc<Greeter> = request.get()?;
//!         Ok::<_, ContainerError>(greeter.settings.greeting)
//!     })
//!     .unwrap();
//!
//! assert_eq!(greeting, "salaam");
//! app.close().unwrap();
//! ```

pub use tanzim_container::*;
pub use tanzim_support::*;
