use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AssetCacheError, Result};

/// Memory tier limits, overridable through `ASSET_CACHE_MEMORY_*`.
pub mod memory {
    use utils::ByteSize;

    utils::config_group!({
        /// Maximum number of decoded assets held in memory.
        ///
        /// The default value is 100.
        ///
        /// Use the environment variable `ASSET_CACHE_MEMORY_MAX_ENTRIES` to set this value.
        ref max_entries: usize = 100;

        /// Maximum summed cost of the decoded assets held in memory.
        ///
        /// The default value is 50mb.
        ///
        /// Use the environment variable `ASSET_CACHE_MEMORY_MAX_COST` to set this value.
        ref max_cost: ByteSize = ByteSize::from("50mb");
    });
}

/// Disk tier budget and layout, overridable through `ASSET_CACHE_DISK_*`.
pub mod disk {
    use utils::ByteSize;

    utils::config_group!({
        /// Total size of persisted entries that triggers eviction.
        ///
        /// The default value is 200mb.
        ///
        /// Use the environment variable `ASSET_CACHE_DISK_MAX_BYTES` to set this value.
        ref max_bytes: ByteSize = ByteSize::from("200mb");

        /// Fraction of `max_bytes` an eviction pass drains down to.
        ///
        /// The default value is 0.8.
        ///
        /// Use the environment variable `ASSET_CACHE_DISK_LOW_WATER_MARK` to set this value.
        ref low_water_mark: f64 = 0.8;

        /// Extension given to every entry file.
        ///
        /// Use the environment variable `ASSET_CACHE_DISK_FILE_EXTENSION` to set this value.
        ref file_extension: String = "jpg".to_string();
    });
}

/// HTTP fetch settings, overridable through `ASSET_CACHE_FETCH_*`.
pub mod fetch {
    utils::config_group!({
        /// Whole-request timeout in milliseconds.
        ///
        /// Use the environment variable `ASSET_CACHE_FETCH_TIMEOUT_MS` to set this value.
        ref timeout_ms: u64 = 30_000;

        ref user_agent: String = concat!("asset_cache/", env!("CARGO_PKG_VERSION")).to_string();
    });
}

/// Capacity limits of both tiers, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheBudget {
    pub memory_max_entries: usize,
    pub memory_max_cost: u64,
    pub disk_max_bytes: u64,
    pub low_water_mark: f64,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self::from_groups(&memory::ConfigValueGroup::new(), &disk::ConfigValueGroup::new())
    }
}

impl CacheBudget {
    fn from_groups(memory: &memory::ConfigValueGroup, disk: &disk::ConfigValueGroup) -> Self {
        Self {
            memory_max_entries: memory.max_entries,
            memory_max_cost: memory.max_cost.as_u64(),
            disk_max_bytes: disk.max_bytes.as_u64(),
            low_water_mark: disk.low_water_mark,
        }
    }

    /// Disk size that eviction drains down to.
    pub fn low_water_target(&self) -> u64 {
        (self.disk_max_bytes as f64 * self.low_water_mark).floor() as u64
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.low_water_mark > 0. && self.low_water_mark <= 1.) {
            return Err(AssetCacheError::config(format!(
                "low water mark must be in (0, 1], got {}",
                self.low_water_mark
            )));
        }
        if self.disk_max_bytes == 0 {
            return Err(AssetCacheError::config("disk budget must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub cache_directory: PathBuf,
    pub file_extension: String,
    pub budget: CacheBudget,
}

impl CacheConfig {
    /// Default limits for a cache rooted at `cache_directory`.
    pub fn new(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            file_extension: disk::ConfigValueGroup::new().file_extension,
            budget: CacheBudget::default(),
        }
    }

    /// Like [`CacheConfig::new`], with `ASSET_CACHE_MEMORY_*` and `ASSET_CACHE_DISK_*` applied.
    pub fn from_env(cache_directory: impl AsRef<Path>) -> Self {
        let memory = memory::ConfigValueGroup::from_env();
        let disk = disk::ConfigValueGroup::from_env();
        let config = Self {
            cache_directory: cache_directory.as_ref().to_path_buf(),
            budget: CacheBudget::from_groups(&memory, &disk),
            file_extension: disk.file_extension,
        };
        info!("asset cache config: {config:?}");
        config
    }

    pub fn with_budget(mut self, budget: CacheBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.budget.validate()
    }
}
