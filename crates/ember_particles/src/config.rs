//! # Manager Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! # Worker threads for the parallel phase. Omit to run it on the caller thread.
//! threads = 4
//! # Optional: reseed every instance added to the manager.
//! seed = 1234
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Upper bound on worker threads.
pub const MAX_THREADS: usize = 64;

/// Worker pool and determinism settings for a [`Manager`](crate::Manager).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Worker threads. `None` runs the parallel phase on the caller thread.
    pub threads: Option<usize>,
    /// When set, each added instance is reseeded from this value and its
    /// handle, so a whole scene replays identically.
    pub seed: Option<u64>,
}

impl ManagerConfig {
    /// Config that runs on `threads` workers.
    #[must_use]
    pub const fn with_threads(threads: usize) -> Self {
        Self {
            threads: Some(threads),
            seed: None,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, and
    /// [`ConfigError::ZeroThreads`] or [`ConfigError::TooManyThreads`] for
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`ManagerConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroThreads`] for `threads = 0` and
    /// [`ConfigError::TooManyThreads`] above [`MAX_THREADS`].
    pub fn validate(&self) -> ConfigResult<()> {
        match self.threads {
            Some(0) => Err(ConfigError::ZeroThreads),
            Some(requested) if requested > MAX_THREADS => Err(ConfigError::TooManyThreads {
                requested,
                max: MAX_THREADS,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ManagerConfig::from_toml_str("threads = 4\nseed = 99\n").unwrap();
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.seed, Some(99));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            ManagerConfig::from_toml_str("thread = 4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_zero_threads() {
        assert!(matches!(
            ManagerConfig::from_toml_str("threads = 0"),
            Err(ConfigError::ZeroThreads)
        ));
    }

    #[test]
    fn test_rejects_too_many_threads() {
        assert!(matches!(
            ManagerConfig::from_toml_str("threads = 1000"),
            Err(ConfigError::TooManyThreads { requested: 1000, max: MAX_THREADS })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("ember_particles_missing_config.toml");
        assert!(matches!(ManagerConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
