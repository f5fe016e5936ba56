//! Scope hierarchy.
//!
//! Scopes are nesting levels that decide how long an instance lives and
//! who shares it. They form a fixed total order, outermost first:
//!
//! ```text
//! Runtime < App < Session < Request < Action < Step
//! ```
//!
//! A container is bound to exactly one scope. A provider declared at
//! scope `P` is visible from a container at scope `C` when `P <= C`, and
//! its instance is cached by the ancestor container bound to `P`.
//!
//! `Runtime` and `Session` are *skipped* levels: plain
//! `Container::enter_scope` passes through them without handing a
//! container for them to the caller.
use std::fmt;

use serde::{Deserialize, Serialize};

/// One level of the scope hierarchy.
///
/// # Examples
/// ```
/// use tanzim_container::scope::Scope;
///
/// assert!(Scope::App < Scope::Request);
/// assert!(Scope::App.is_visible_from(Scope::Request));
/// assert!(!Scope::Request.is_visible_from(Scope::App));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Process-wide values that exist before the application is wired,
    /// such as settings loaded from the environment.
    Runtime,

    /// One instance per application: pools, clients, caches.
    App,

    /// One instance per long-lived connection or session.
    Session,

    /// One instance per request or command invocation.
    Request,

    /// One instance per unit of work inside a request.
    Action,

    /// Innermost level, for single steps of an action.
    Step,
}

impl Scope {
    /// All scopes, outermost first.
    pub const ALL: [Scope; 6] = [
        Scope::Runtime,
        Scope::App,
        Scope::Session,
        Scope::Request,
        Scope::Action,
        Scope::Step,
    ];

    /// Position in the hierarchy; `0` is the outermost level.
    #[inline]
    pub fn level(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_level(level: usize) -> Option<Scope> {
        Self::ALL.get(level).copied()
    }

    /// Whether `enter_scope` passes through this level implicitly.
    #[inline]
    pub fn is_skipped(self) -> bool {
        matches!(self, Scope::Runtime | Scope::Session)
    }

    /// A provider at `self` may be resolved from a container at `container`.
    #[inline]
    pub fn is_visible_from(self, container: Scope) -> bool {
        self <= container
    }

    /// The next inner level, if any.
    #[inline]
    pub fn inner(self) -> Option<Scope> {
        Self::from_level(self.level() + 1)
    }

    /// Levels traversed when entering from `self`: every level strictly
    /// inside `self` up to and including the first non-skipped one.
    pub fn entry_path(self) -> Option<Vec<Scope>> {
        let mut path = Vec::new();
        let mut current = self;
        while let Some(next) = current.inner() {
            path.push(next);
            if !next.is_skipped() {
                return Some(path);
            }
            current = next;
        }
        None
    }

    /// Levels traversed when entering `target` from `self`, or `None`
    /// when `target` is not strictly inside `self`.
    pub fn path_to(self, target: Scope) -> Option<Vec<Scope>> {
        (target > self).then(|| Self::ALL[self.level() + 1..=target.level()].to_vec())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Runtime => "Runtime",
            Scope::App => "App",
            Scope::Session => "Session",
            Scope::Request => "Request",
            Scope::Action => "Action",
            Scope::Step => "Step",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_declaration_order() {
        for (i, scope) in Scope::ALL.iter().enumerate() {
            assert_eq!(scope.level(), i);
            assert_eq!(Scope::from_level(i), Some(*scope));
        }
        assert_eq!(Scope::from_level(6), None);
    }

    #[test]
    fn visibility_is_outer_or_same() {
        assert!(Scope::App.is_visible_from(Scope::App));
        assert!(Scope::Runtime.is_visible_from(Scope::Step));
        assert!(!Scope::Action.is_visible_from(Scope::Request));
    }

    #[test]
    fn entry_skips_runtime_and_session() {
        assert_eq!(Scope::Runtime.entry_path(), Some(vec![Scope::App]));
        assert_eq!(Scope::App.entry_path(), Some(vec![Scope::Session, Scope::Request]));
        assert_eq!(Scope::Request.entry_path(), Some(vec![Scope::Action]));
        assert_eq!(Scope::Step.entry_path(), None);
    }

    #[test]
    fn explicit_path_includes_every_level() {
        assert_eq!(Scope::App.path_to(Scope::Session), Some(vec![Scope::Session]));
        assert_eq!(
            Scope::Runtime.path_to(Scope::Request),
            Some(vec![Scope::App, Scope::Session, Scope::Request])
        );
        assert_eq!(Scope::Request.path_to(Scope::App), None);
        assert_eq!(Scope::Request.path_to(Scope::Request), None);
    }

    #[test]
    fn display_and_serde_names() {
        assert_eq!(Scope::Request.to_string(), "Request");
        assert_eq!(serde_json::to_string(&Scope::Request).unwrap(), "\"request\"");
        let parsed: Scope = serde_json::from_str("\"session\"").unwrap();
        assert_eq!(parsed, Scope::Session);
    }
}
