//! Registry settings.
//!
//! Settings can be built in code or deserialized from an application's
//! configuration file; missing fields take their defaults.

use serde::{Deserialize, Serialize};

/// Knobs applied when a registry is built.
///
/// # Examples
/// ```
/// use tanzim_container::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.allow_override);
/// assert!(!settings.strict_cycles);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// A later registration of the same key replaces the earlier one
    /// instead of being reported as a duplicate.
    pub allow_override: bool,

    /// Cycles without any deferred edge are reported by `build()` instead
    /// of failing the first `get` that walks into them.
    pub strict_cycles: bool,
}
