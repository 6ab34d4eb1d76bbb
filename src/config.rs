//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment
//! variables or a deserialized settings document.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Smallest accepted engine map size in bytes
pub const MIN_MAX_SIZE: usize = 16 * 1024;

/// Default engine map size (200 MiB)
pub const DEFAULT_MAX_SIZE: usize = 200 * 1024 * 1024;

/// Default number of concurrent engine readers
pub const DEFAULT_MAX_READERS: u32 = 2048;

/// Default minimum interval between expiration sweeps
pub const DEFAULT_SCAN_FREQUENCY: Duration = Duration::from_secs(60);

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the engine environment
    pub data_path: PathBuf,
    /// Upper bound on the engine's on-disk size in bytes
    pub max_size: usize,
    /// Maximum number of concurrent read transactions
    pub max_readers: u32,
    /// Minimum time between two background sweeps
    pub expiration_scan_frequency: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LIGHTNING_CACHE_DATA_PATH` - Engine directory (default: current directory)
    /// - `LIGHTNING_CACHE_MAX_SIZE` - Max size in bytes (default: 200 MiB)
    /// - `LIGHTNING_CACHE_MAX_READERS` - Max readers (default: 2048)
    /// - `LIGHTNING_CACHE_SCAN_FREQUENCY_SECS` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            data_path: env::var_os("LIGHTNING_CACHE_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            max_size: env::var("LIGHTNING_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size),
            max_readers: env::var("LIGHTNING_CACHE_MAX_READERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_readers),
            expiration_scan_frequency: env::var("LIGHTNING_CACHE_SCAN_FREQUENCY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiration_scan_frequency),
        }
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_scan_frequency(mut self, frequency: Duration) -> Self {
        self.expiration_scan_frequency = frequency;
        self
    }

    // == Validate ==
    /// Rejects settings the engine cannot be opened with.
    pub fn validate(&self) -> Result<()> {
        if self.max_size < MIN_MAX_SIZE {
            return Err(CacheError::InvalidArgument(format!(
                "max_size must be at least {} bytes, got {}",
                MIN_MAX_SIZE, self.max_size
            )));
        }
        if self.max_readers == 0 {
            return Err(CacheError::InvalidArgument(
                "max_readers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_path: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_size: DEFAULT_MAX_SIZE,
            max_readers: DEFAULT_MAX_READERS,
            expiration_scan_frequency: DEFAULT_SCAN_FREQUENCY,
        }
    }
}
