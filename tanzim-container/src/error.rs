//! Error types for Tanzim container operations.
//!
//! Configuration problems are collected and reported together when the
//! registry is built. Everything else surfaces from a single `get`,
//! `enter_scope` or `close` call.

use std::fmt;

use tanzim_support::rendering::{PathEntry, render_cycle, render_numbered, render_path, suggest_similar};

use crate::key::DependencyKey;
use crate::scope::Scope;

/// Error type user factories and teardown hooks return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all Tanzim operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// The registry failed validation; every problem found is listed.
    #[error("{}", .0)]
    Configuration(ConfigurationError),

    /// `get` was called for a type that has no provider.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A cycle had to be broken on an edge that needs a concrete instance.
    #[error("{}", .0)]
    UnbindableCycle(UnbindableCycleError),

    #[error("Container for scope {scope} is closed")]
    ContainerClosed { scope: Scope },

    /// The provider lives in a scope the calling container has not entered.
    #[error(
        "Cannot resolve {key} from a {current} container: its provider is declared at {required}\n  \
         Hint: enter the {required} scope first"
    )]
    ScopeNotEntered {
        key: DependencyKey,
        required: Scope,
        current: Scope,
    },

    #[error("Cannot enter a scope inside {current}: it is the innermost scope")]
    NoInnerScope { current: Scope },

    #[error("Cannot enter {target} from {current}: the target must be an inner scope")]
    InvalidScopeTarget { current: Scope, target: Scope },

    /// A parent container was closed while children were still open.
    #[error(
        "Cannot close {scope} container: {open} child container(s) still open\n  \
         Hint: close inner scopes before outer ones"
    )]
    ChildrenStillOpen { scope: Scope, open: usize },

    /// A user factory returned an error.
    #[error("Failed to construct {key}: {source}")]
    FactoryFailed {
        key: DependencyKey,
        #[source]
        source: BoxError,
    },

    /// A factory asked for a dependency its provider never declared.
    #[error(
        "{consumer} asked for {dependency}, which its provider does not declare\n  \
         Hint: declare it with .needs() or .needs_deferred() when registering {consumer}"
    )]
    UndeclaredDependency {
        consumer: DependencyKey,
        dependency: DependencyKey,
    },

    /// One or more teardown hooks failed during `close`.
    #[error("{}", .0)]
    TeardownFailed(TeardownError),
}

/// A single problem found while building a registry.
#[derive(Debug)]
pub enum ConfigurationProblem {
    MissingProvider(NotRegisteredError),
    DuplicateProvider { key: DependencyKey },
    ScopeViolation(ScopeViolationError),
    AliasMismatch { alias: DependencyKey, target: DependencyKey },
    UnbindableCycle(UnbindableCycleError),
}

impl ConfigurationProblem {
    /// The key the problem is about.
    pub fn key(&self) -> Option<&DependencyKey> {
        match self {
            ConfigurationProblem::MissingProvider(e) => Some(&e.requested),
            ConfigurationProblem::DuplicateProvider { key } => Some(key),
            ConfigurationProblem::ScopeViolation(e) => Some(&e.consumer),
            ConfigurationProblem::AliasMismatch { alias, .. } => Some(alias),
            ConfigurationProblem::UnbindableCycle(e) => e.keys().next(),
        }
    }

    fn involves(&self, key: &DependencyKey) -> bool {
        match self {
            ConfigurationProblem::MissingProvider(e) => {
                e.requested == *key || e.required_by.as_ref() == Some(key)
            }
            ConfigurationProblem::ScopeViolation(e) => e.consumer == *key || e.dependency == *key,
            ConfigurationProblem::AliasMismatch { alias, target } => alias == key || target == key,
            ConfigurationProblem::UnbindableCycle(e) => e.keys().any(|k| k == key),
            ConfigurationProblem::DuplicateProvider { key: duplicate } => duplicate == key,
        }
    }
}

impl fmt::Display for ConfigurationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationProblem::MissingProvider(e) => e.fmt(f),
            ConfigurationProblem::DuplicateProvider { key } => write!(
                f,
                "Provider registered twice: {key}\n  Hint: enable allow_override to let the last registration win"
            ),
            ConfigurationProblem::ScopeViolation(e) => e.fmt(f),
            ConfigurationProblem::AliasMismatch { alias, target } => write!(
                f,
                "Alias {alias} points to {target}, which is a different type"
            ),
            ConfigurationProblem::UnbindableCycle(e) => e.fmt(f),
        }
    }
}

/// All problems found by one `build()` call.
#[derive(Debug)]
pub struct ConfigurationError {
    pub problems: Vec<ConfigurationProblem>,
}

impl ConfigurationError {
    /// Whether any problem concerns `key`.
    pub fn mentions(&self, key: &DependencyKey) -> bool {
        self.problems.iter().any(|p| p.involves(key))
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Invalid container configuration ({} problem(s)):", self.problems.len())?;
        let rendered: Vec<String> = self.problems.iter().map(ToString::to_string).collect();
        f.write_str(render_numbered(&rendered).trim_end())
    }
}

/// A dependency with no provider.
#[derive(Debug)]
pub struct NotRegisteredError {
    pub requested: DependencyKey,
    /// The provider that declared the dependency, if any.
    pub required_by: Option<DependencyKey>,
    /// Registered keys with similar names.
    pub suggestions: Vec<DependencyKey>,
}

impl NotRegisteredError {
    /// Builds the error, picking suggestions among `registered`.
    pub(crate) fn new<'a>(
        requested: DependencyKey,
        required_by: Option<DependencyKey>,
        registered: impl IntoIterator<Item = &'a DependencyKey>,
    ) -> Self {
        let registered: Vec<&DependencyKey> = registered.into_iter().collect();
        let names: Vec<&str> = registered.iter().map(|k| k.type_name()).collect();
        let picked = suggest_similar(requested.type_name(), &names, 3);
        let suggestions = registered
            .into_iter()
            .filter(|k| picked.iter().any(|name| name == k.type_name()))
            .copied()
            .collect();

        Self { requested, required_by, suggestions }
    }
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency not registered: {}", self.requested)?;

        if let Some(parent) = &self.required_by {
            let chain = [parent.short_name(), self.requested.short_name()];
            write!(f, "\n  Required by: {}", render_path(&chain))?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register a provider for {}",
            self.requested.type_name()
        )
    }
}

/// A provider depends on something shorter-lived than itself.
#[derive(Debug)]
pub struct ScopeViolationError {
    pub consumer: DependencyKey,
    pub consumer_scope: Scope,
    pub dependency: DependencyKey,
    pub dependency_scope: Scope,
}

impl fmt::Display for ScopeViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scope violation: {} ({}) depends on {} ({})",
            self.consumer, self.consumer_scope, self.dependency, self.dependency_scope,
        )?;
        write!(
            f,
            "\n  A {} provider outlives every {} instance it could hold",
            self.consumer_scope, self.dependency_scope,
        )?;
        write!(
            f,
            "\n  Hint: declare {} at {} or an outer scope",
            self.dependency, self.consumer_scope,
        )
    }
}

/// One hop of an unbindable cycle.
#[derive(Debug, Clone)]
pub struct CycleHop {
    pub key: DependencyKey,
    pub scope: Scope,
    /// Whether the edge leaving this hop accepts a deferred reference.
    pub deferred: bool,
}

/// A cycle that cannot be broken with a placeholder.
///
/// The path starts and ends with the same key.
#[derive(Debug)]
pub struct UnbindableCycleError {
    pub path: Vec<CycleHop>,
}

impl UnbindableCycleError {
    pub fn keys(&self) -> impl Iterator<Item = &DependencyKey> {
        self.path.iter().map(|hop| &hop.key)
    }
}

impl fmt::Display for UnbindableCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<PathEntry> = self
            .path
            .iter()
            .map(|hop| PathEntry {
                type_name: hop.key.short_name(),
                scope: hop.scope.to_string(),
                deferred: hop.deferred,
            })
            .collect();

        writeln!(f, "Unbindable dependency cycle:")?;
        for line in render_cycle(&entries).lines() {
            writeln!(f, "  {line}")?;
        }
        write!(
            f,
            "  Hint: declare one edge of the cycle with .needs_deferred::<T>() and store a Deferred<T>"
        )
    }
}

/// Teardown hooks that failed during one `close`.
#[derive(Debug)]
pub struct TeardownError {
    pub scope: Scope,
    pub failures: Vec<(DependencyKey, BoxError)>,
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} teardown hook(s) failed while closing {} container:",
            self.failures.len(),
            self.scope,
        )?;
        for (key, error) in &self.failures {
            write!(f, "\n  - {key}: {error}")?;
        }
        Ok(())
    }
}

/// Convenient Result type for Tanzim operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
