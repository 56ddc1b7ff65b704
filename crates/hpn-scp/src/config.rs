//! Session configuration: the immutable bundle of flags that replaces the
//! original tool's process-wide option globals.

use serde::{Deserialize, Serialize};

/// Immutable per-invocation configuration for an [`crate::session::Session`].
///
/// Loadable from a config file via `serde`/`toml`, then overridden
/// field-by-field from explicit CLI flags; see [`SessionConfigBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recurse into directories (`-r`).
    pub recursive: bool,
    /// Preserve modification/access times (`-p`).
    pub preserve: bool,
    /// Treat the destination as a directory even if it does not exist yet.
    pub target_is_directory: bool,
    /// Negotiate hash-based resume on `C` records.
    pub resume: bool,
    /// Bandwidth cap in kilobits/sec; `None` or `0` means unlimited.
    pub bandwidth_limit_kbps: Option<u64>,
    /// Emit a per-file progress line.
    pub verbose: bool,
    /// Suppress progress output entirely.
    pub quiet: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            recursive: false,
            preserve: false,
            target_is_directory: false,
            resume: false,
            bandwidth_limit_kbps: None,
            verbose: false,
            quiet: false,
        }
    }
}

impl SessionConfig {
    /// Starts a [`SessionConfigBuilder`] seeded with these values, so a
    /// config file's defaults can be layered with CLI overrides.
    #[must_use]
    pub fn as_builder(&self) -> SessionConfigBuilder {
        SessionConfigBuilder { config: self.clone() }
    }
}

/// Fluent builder for [`SessionConfig`], in the style of `arti-client`'s
/// `TorClientBuilder`: start from defaults (or a file-loaded config),
/// override only what the caller cares about, then [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Starts from [`SessionConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        SessionConfigBuilder::default()
    }

    /// Sets [`SessionConfig::recursive`].
    #[must_use]
    pub fn recursive(mut self, value: bool) -> Self {
        self.config.recursive = value;
        self
    }

    /// Sets [`SessionConfig::preserve`].
    #[must_use]
    pub fn preserve(mut self, value: bool) -> Self {
        self.config.preserve = value;
        self
    }

    /// Sets [`SessionConfig::target_is_directory`].
    #[must_use]
    pub fn target_is_directory(mut self, value: bool) -> Self {
        self.config.target_is_directory = value;
        self
    }

    /// Sets [`SessionConfig::resume`].
    #[must_use]
    pub fn resume(mut self, value: bool) -> Self {
        self.config.resume = value;
        self
    }

    /// Sets [`SessionConfig::bandwidth_limit_kbps`].
    #[must_use]
    pub fn bandwidth_limit_kbps(mut self, value: Option<u64>) -> Self {
        self.config.bandwidth_limit_kbps = value;
        self
    }

    /// Sets [`SessionConfig::verbose`].
    #[must_use]
    pub fn verbose(mut self, value: bool) -> Self {
        self.config.verbose = value;
        self
    }

    /// Sets [`SessionConfig::quiet`].
    #[must_use]
    pub fn quiet(mut self, value: bool) -> Self {
        self.config.quiet = value;
        self
    }

    /// Finishes the builder, producing an immutable [`SessionConfig`].
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_overrides_only_requested_fields() {
        let base = SessionConfig {
            recursive: true,
            preserve: true,
            ..SessionConfig::default()
        };
        let overridden = base.as_builder().quiet(true).build();
        assert!(overridden.recursive);
        assert!(overridden.preserve);
        assert!(overridden.quiet);
        assert!(!overridden.resume);
    }

    #[test]
    fn default_is_fully_permissive_baseline() {
        let config = SessionConfig::default();
        assert!(!config.recursive);
        assert_eq!(config.bandwidth_limit_kbps, None);
    }
}
