//! Provider registry.
//!
//! [`RegistryBuilder`] collects registrations and aliases; [`build`]
//! validates the whole graph at once and produces an immutable
//! [`Registry`] in which every dependency is already mapped to the
//! provider that satisfies it.
//!
//! [`build`]: RegistryBuilder::build

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigurationError, ConfigurationProblem, ContainerError, Result};
use crate::graph::{DependencyInfo, GraphValidator};
use crate::key::DependencyKey;
use crate::provider::{Binding, Edge, FactoryFn, FinalizerFn, Provider, ProviderRegistry, Registration};
use crate::scope::Scope;
use crate::settings::Settings;

/// A dependency with its provider already looked up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedDependency {
    /// The key the factory asks its arguments for.
    pub requested: DependencyKey,
    /// The key of the provider that satisfies it (aliases followed).
    pub key: DependencyKey,
    pub edge: Edge,
    /// The edge lies on a dependency cycle.
    pub cyclic: bool,
}

/// A validated provider.
pub(crate) struct Provision {
    pub key: DependencyKey,
    pub scope: Scope,
    pub dependencies: Vec<ResolvedDependency>,
    pub factory: FactoryFn,
    pub finalizer: Option<FinalizerFn>,
}

impl fmt::Debug for Provision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provision")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Collects registrations before validation.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use tanzim_container::prelude::*;
///
/// struct Config { dsn: &'static str }
/// struct Pool { config: Arc<Config> }
///
/// let registry = Registry::builder()
///     .value(Scope::App, Config { dsn: "postgres://localhost" })
///     .provide(
///         Binding::<Pool>::new(Scope::App)
///             .needs::<Config>()
///             .to(|args| Ok(Pool { config: args.get()? })),
///     )
///     .build()
///     .expect("valid configuration");
///
/// assert!(registry.contains(&DependencyKey::of::<Pool>()));
/// ```
pub struct RegistryBuilder {
    registrations: HashMap<DependencyKey, Registration>,
    aliases: HashMap<DependencyKey, DependencyKey>,
    duplicates: Vec<DependencyKey>,
    settings: Settings,
}

impl RegistryBuilder {
    fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            aliases: HashMap::new(),
            duplicates: Vec::new(),
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Let a later registration of a key replace an earlier one.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    pub fn provide(mut self, registration: Registration) -> Self {
        self.add(registration);
        self
    }

    /// Registers a ready instance of `T` at `scope`.
    pub fn value<T: Send + Sync + 'static>(self, scope: Scope, value: T) -> Self {
        self.provide(Binding::<T>::new(scope).to_value(value))
    }

    /// Makes `alias` resolve through the provider of `target`.
    pub fn alias(mut self, alias: DependencyKey, target: DependencyKey) -> Self {
        self.add_alias(alias, target);
        self
    }

    pub fn add_provider(mut self, provider: &dyn Provider) -> Self {
        debug!(provider = provider.name(), "Adding provider module");
        provider.register(&mut self);
        self
    }

    /// Validates every registration and freezes the registry.
    ///
    /// # Errors
    /// [`ContainerError::Configuration`] listing every duplicate, missing
    /// provider, scope violation and alias mismatch found. With
    /// [`Settings::strict_cycles`], cycles that have no deferred edge are
    /// listed too.
    #[instrument(skip(self), name = "registry_build")]
    pub fn build(self) -> Result<Registry> {
        info!(
            registered = self.registrations.len(),
            aliases = self.aliases.len(),
            "Building registry"
        );

        let mut problems: Vec<ConfigurationProblem> = self
            .duplicates
            .iter()
            .map(|key| ConfigurationProblem::DuplicateProvider { key: *key })
            .collect();

        let infos: HashMap<DependencyKey, DependencyInfo> = self
            .registrations
            .iter()
            .map(|(key, reg)| {
                (
                    *key,
                    DependencyInfo {
                        key: *key,
                        scope: reg.scope,
                        dependencies: reg.dependencies.clone(),
                    },
                )
            })
            .collect();

        let validator = GraphValidator::new(&infos, &self.aliases);
        problems.extend(validator.validate());

        if !problems.is_empty() {
            for problem in &problems {
                warn!(key = ?problem.key(), "{problem}");
            }
            return Err(ContainerError::Configuration(ConfigurationError { problems }));
        }

        let analysis = validator.analyze();
        let cycles = validator.eager_cycles(&analysis);
        for cycle in &cycles {
            warn!(
                path = ?cycle.keys().map(DependencyKey::short_name).collect::<Vec<_>>(),
                "Cycle without a deferred edge; resolving it will fail"
            );
        }
        if self.settings.strict_cycles && !cycles.is_empty() {
            return Err(ContainerError::Configuration(ConfigurationError {
                problems: cycles.into_iter().map(ConfigurationProblem::UnbindableCycle).collect(),
            }));
        }

        let provisions = self
            .registrations
            .into_iter()
            .map(|(key, reg)| {
                let dependencies = reg
                    .dependencies
                    .iter()
                    .filter_map(|dep| {
                        let target = validator.canonical(&dep.key)?;
                        Some(ResolvedDependency {
                            requested: dep.key,
                            key: target,
                            edge: dep.edge,
                            cyclic: analysis.is_cyclic(&key, &target),
                        })
                    })
                    .collect();
                let provision = Provision {
                    key,
                    scope: reg.scope,
                    dependencies,
                    factory: reg.factory,
                    finalizer: reg.finalizer,
                };
                (key, provision)
            })
            .collect();

        info!("Registry built");
        Ok(Registry {
            provisions,
            aliases: self.aliases,
            settings: self.settings,
        })
    }
}

impl ProviderRegistry for RegistryBuilder {
    fn add(&mut self, registration: Registration) {
        let key = registration.key;
        if self.registrations.contains_key(&key) && !self.settings.allow_override {
            warn!(key = %key, "Duplicate registration");
            self.duplicates.push(key);
            return;
        }
        debug!(key = %key, scope = %registration.scope, "Registered provider");
        self.registrations.insert(key, registration);
    }

    fn add_alias(&mut self, alias: DependencyKey, target: DependencyKey) {
        if self.aliases.contains_key(&alias) && !self.settings.allow_override {
            warn!(alias = %alias, "Duplicate alias");
            self.duplicates.push(alias);
            return;
        }
        debug!(alias = %alias, target = %target, "Registered alias");
        self.aliases.insert(alias, target);
    }
}

/// Immutable table of validated providers.
///
/// Build one at startup with [`Registry::builder`] and share it between
/// every container opened from it.
pub struct Registry {
    provisions: HashMap<DependencyKey, Provision>,
    aliases: HashMap<DependencyKey, DependencyKey>,
    settings: Settings,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up the provider for `key`, following aliases.
    pub(crate) fn lookup(&self, key: &DependencyKey) -> Option<&Provision> {
        self.provisions
            .get(key)
            .or_else(|| self.aliases.get(key).and_then(|target| self.provisions.get(target)))
    }

    /// Whether `key` is provided, directly or through an alias.
    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Scope of the provider behind `key`.
    pub fn scope_of(&self, key: &DependencyKey) -> Option<Scope> {
        self.lookup(key).map(|p| p.scope)
    }

    /// All resolvable keys, aliases included.
    pub fn keys(&self) -> impl Iterator<Item = &DependencyKey> {
        self.provisions.keys().chain(self.aliases.keys())
    }

    /// Number of providers, aliases excluded.
    pub fn len(&self) -> usize {
        self.provisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provisions.is_empty()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.provisions.len())
            .field("aliases", &self.aliases.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    struct Database;
    struct Repository;
    struct Handler;

    fn database() -> Registration {
        Binding::<Database>::new(Scope::App).to(|_| Ok(Database))
    }

    fn configuration_problems(result: Result<Registry>) -> Vec<ConfigurationProblem> {
        match result {
            Err(ContainerError::Configuration(err)) => err.problems,
            Err(other) => panic!("expected configuration error, got: {other:?}"),
            Ok(_) => panic!("expected configuration error, got a registry"),
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::builder().provide(database()).build().unwrap();
        assert!(registry.contains(&DependencyKey::of::<Database>()));
        assert_eq!(registry.scope_of(&DependencyKey::of::<Database>()), Some(Scope::App));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_is_a_configuration_problem() {
        let problems = configuration_problems(
            Registry::builder().provide(database()).provide(database()).build(),
        );
        assert!(matches!(
            problems.as_slice(),
            [ConfigurationProblem::DuplicateProvider { key }] if *key == DependencyKey::of::<Database>()
        ));
    }

    #[test]
    fn duplicate_with_override_keeps_last() {
        let registry = Registry::builder()
            .allow_override(true)
            .provide(database())
            .provide(Binding::<Database>::new(Scope::Request).to(|_| Ok(Database)))
            .build()
            .unwrap();
        assert_eq!(registry.scope_of(&DependencyKey::of::<Database>()), Some(Scope::Request));
    }

    #[test]
    fn problems_are_reported_together() {
        let problems = configuration_problems(
            Registry::builder()
                .provide(Binding::<Repository>::new(Scope::App).needs::<Database>().to(|_| Ok(Repository)))
                .provide(Binding::<Handler>::new(Scope::Request).to(|_| Ok(Handler)))
                .provide(Binding::<Database>::new(Scope::App).needs::<Handler>().to(|_| Ok(Database)))
                .provide(Binding::<u8>::new(Scope::App).needs::<u16>().to(|_| Ok(1)))
                .build(),
        );

        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| matches!(p, ConfigurationProblem::ScopeViolation(_))));
        assert!(problems.iter().any(|p| matches!(p, ConfigurationProblem::MissingProvider(_))));
    }

    #[test]
    fn alias_resolves_to_target() {
        let alias = DependencyKey::named::<Database>("primary");
        let registry = Registry::builder()
            .provide(database())
            .alias(alias, DependencyKey::of::<Database>())
            .build()
            .unwrap();

        assert!(registry.contains(&alias));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.keys().count(), 2);
    }

    #[test]
    fn strict_cycles_rejects_eager_cycles() {
        let build = |settings: Settings| {
            Registry::builder()
                .with_settings(settings)
                .provide(Binding::<Repository>::new(Scope::App).needs::<Handler>().to(|_| Ok(Repository)))
                .provide(Binding::<Handler>::new(Scope::App).needs::<Repository>().to(|_| Ok(Handler)))
                .build()
        };

        assert!(build(Settings::default()).is_ok());
        let problems = configuration_problems(build(Settings { strict_cycles: true, ..Settings::default() }));
        assert!(matches!(problems.as_slice(), [ConfigurationProblem::UnbindableCycle(_)]));
    }

    #[test]
    fn dependencies_are_annotated() {
        let registry = Registry::builder()
            .provide(database())
            .provide(
                Binding::<Repository>::new(Scope::Request)
                    .needs::<Database>()
                    .needs_deferred::<Handler>()
                    .to(|_| Ok(Repository)),
            )
            .provide(Binding::<Handler>::new(Scope::Request).needs::<Repository>().to(|_| Ok(Handler)))
            .build()
            .unwrap();

        let repository = registry.lookup(&DependencyKey::of::<Repository>()).unwrap();
        assert!(!repository.dependencies[0].cyclic);
        assert!(repository.dependencies[1].cyclic);
    }
}
