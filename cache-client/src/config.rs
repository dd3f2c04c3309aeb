//! Cache configuration.
//!
//! Configuration can be built in code, from [`CacheOption`] flags, or loaded
//! from a TOML file:
//!
//! ```toml
//! single_node = false
//! cache_data = true
//! refresh_retry_delay_ms = 100
//! max_refresh_attempts = 3
//! require_connection = false
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Construction flags accepted by [`MirrorCache::build`](crate::MirrorCache::build).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOption {
    /// Track exactly the root path, with no recursion into children.
    SingleNodeCache,
    /// Keep node stats but not data bytes.
    DataNotCached,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Track only the root node (default: false).
    #[serde(default)]
    pub single_node: bool,
    /// Keep node data bytes in the table (default: true).
    #[serde(default = "default_cache_data")]
    pub cache_data: bool,
    /// Delay between re-issues of a failed read, in milliseconds (default: 100).
    #[serde(default = "default_refresh_retry_delay_ms")]
    pub refresh_retry_delay_ms: u64,
    /// Total attempts for one read before the refresh is abandoned (default: 3).
    /// An abandoned refresh is picked up again by the next re-crawl.
    #[serde(default = "default_max_refresh_attempts")]
    pub max_refresh_attempts: u32,
    /// Fail `start()` when the store is not connected (default: false).
    #[serde(default)]
    pub require_connection: bool,
}

// Default value functions
fn default_cache_data() -> bool {
    true
}

fn default_refresh_retry_delay_ms() -> u64 {
    100
}

fn default_max_refresh_attempts() -> u32 {
    3
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            single_node: false,
            cache_data: default_cache_data(),
            refresh_retry_delay_ms: default_refresh_retry_delay_ms(),
            max_refresh_attempts: default_max_refresh_attempts(),
            require_connection: false,
        }
    }
}

impl CacheConfig {
    /// Build a configuration from construction flags.
    pub fn from_options(options: &[CacheOption]) -> Self {
        let mut config = Self::default();
        for option in options {
            match option {
                CacheOption::SingleNodeCache => config.single_node = true,
                CacheOption::DataNotCached => config.cache_data = false,
            }
        }
        config
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set single-node mode.
    pub fn with_single_node(mut self, single_node: bool) -> Self {
        self.single_node = single_node;
        self
    }

    /// Set whether data bytes are cached.
    pub fn with_cache_data(mut self, cache_data: bool) -> Self {
        self.cache_data = cache_data;
        self
    }

    /// Set the retry delay.
    pub fn with_refresh_retry_delay(mut self, delay: Duration) -> Self {
        self.refresh_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the number of attempts per read.
    pub fn with_max_refresh_attempts(mut self, attempts: u32) -> Self {
        self.max_refresh_attempts = attempts;
        self
    }

    /// Require a live connection at start.
    pub fn with_require_connection(mut self, require: bool) -> Self {
        self.require_connection = require;
        self
    }

    /// Retry delay as a [`Duration`].
    pub fn refresh_retry_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_retry_delay_ms)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_refresh_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_refresh_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Configuration values are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert!(!config.single_node);
        assert!(config.cache_data);
        assert_eq!(config.refresh_retry_delay(), Duration::from_millis(100));
        assert_eq!(config.max_refresh_attempts, 3);
        assert!(!config.require_connection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn options_map_to_fields() {
        let config =
            CacheConfig::from_options(&[CacheOption::SingleNodeCache, CacheOption::DataNotCached]);
        assert!(config.single_node);
        assert!(!config.cache_data);

        assert_eq!(CacheConfig::from_options(&[]), CacheConfig::default());
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let config: CacheConfig = toml::from_str("single_node = true").unwrap();
        assert!(config.single_node);
        assert!(config.cache_data);
        assert_eq!(config.max_refresh_attempts, 3);
    }

    #[test]
    fn builder_methods() {
        let config = CacheConfig::default()
            .with_single_node(true)
            .with_cache_data(false)
            .with_refresh_retry_delay(Duration::from_millis(5))
            .with_max_refresh_attempts(7)
            .with_require_connection(true);
        assert!(config.single_node);
        assert!(!config.cache_data);
        assert_eq!(config.refresh_retry_delay_ms, 5);
        assert_eq!(config.max_refresh_attempts, 7);
        assert!(config.require_connection);
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let config = CacheConfig::default().with_max_refresh_attempts(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_data = false\nrefresh_retry_delay_ms = 250").unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert!(!config.cache_data);
        assert_eq!(config.refresh_retry_delay_ms, 250);
    }

    #[test]
    fn from_file_errors() {
        let missing = CacheConfig::from_file(std::path::Path::new("/nonexistent/cache.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "single_node = \"yes\"").unwrap();
        let bad = CacheConfig::from_file(file.path());
        assert!(matches!(bad, Err(ConfigError::ParseError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_refresh_attempts = 0").unwrap();
        let invalid = CacheConfig::from_file(file.path());
        assert!(matches!(invalid, Err(ConfigError::Invalid(_))));
    }
}
