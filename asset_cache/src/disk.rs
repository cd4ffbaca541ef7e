use std::fs::{self, DirEntry};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use error_printer::ErrorPrinter;
use file_utils::{is_temp_file_name, SafeFileCreator};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AssetCacheError, Result};
use crate::key::ContentKey;

#[cfg(test)]
mod test_utils;

pub const DEFAULT_LOW_WATER_MARK: f64 = 0.8;

/// A persisted entry as seen in the directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    pub key: ContentKey,
    pub size: u64,
    pub modified: SystemTime,
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionSummary {
    /// Keys deleted, oldest first.
    pub evicted: Vec<ContentKey>,
    /// Keys whose deletion failed; they are still counted in `total_after`.
    pub failed: Vec<ContentKey>,
    pub bytes_freed: u64,
    pub total_before: u64,
    pub total_after: u64,
}

/// DiskTier stores encoded asset bytes on the local filesystem, one file per content key.
///
/// Layout:
///
/// cache_root/
/// ├── [sha256 hex of identifier 1].jpg
/// ├── [sha256 hex of identifier 2].jpg
/// └── .[name].[random].tmp        (in-progress write)
///
/// There is no index: the directory listing plus each file's modification time is the only
/// metadata. Writes go to a temporary file and are renamed into place, so readers never see
/// a torn entry. After every write, if the summed entry size exceeds `max_bytes`, the oldest
/// entries (by modification time, then by key) are deleted until the total is at or below
/// `low_water_mark * max_bytes`.
///
/// Filesystem work runs on tokio's blocking pool; the handle is cheap to clone.
#[derive(Debug, Clone)]
pub struct DiskTier {
    cache_root: PathBuf,
    extension: Arc<str>,
    max_bytes: u64,
    low_water_mark: f64,
    eviction_lock: Arc<Mutex<()>>,
}

impl DiskTier {
    /// Opens (creating if needed) the cache directory at `cache_root`.
    ///
    /// Stray temporary files from interrupted writes are removed, and one eviction pass runs
    /// so that a budget lowered since the last run takes effect immediately.
    pub fn initialize(
        cache_root: impl Into<PathBuf>,
        extension: &str,
        max_bytes: u64,
        low_water_mark: f64,
    ) -> Result<Self> {
        check_low_water_mark(low_water_mark)?;
        if extension.contains(['/', '\\', '.']) {
            return Err(AssetCacheError::config(format!(
                "file extension {extension:?} must not contain separators or dots"
            )));
        }

        let cache_root = cache_root.into();
        fs::create_dir_all(&cache_root)?;

        let tier = Self {
            cache_root,
            extension: Arc::from(extension),
            max_bytes,
            low_water_mark,
            eviction_lock: Arc::new(Mutex::new(())),
        };

        let removed = tier.remove_stale_temp_files()?;
        if removed > 0 {
            info!("removed {removed} stale temporary files from {:?}", tier.cache_root);
        }
        tier.evict_if_over_budget_impl()?;

        Ok(tier)
    }

    /// A handle to the same directory under a different budget. No eviction pass is run.
    pub fn with_budget(&self, max_bytes: u64, low_water_mark: f64) -> Result<Self> {
        check_low_water_mark(low_water_mark)?;
        Ok(Self {
            max_bytes,
            low_water_mark,
            ..self.clone()
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn low_water_mark(&self) -> f64 {
        self.low_water_mark
    }

    /// The total size an eviction pass drains down to.
    pub fn low_water_target(&self) -> u64 {
        (self.max_bytes as f64 * self.low_water_mark).floor() as u64
    }

    pub fn entry_path(&self, key: &ContentKey) -> PathBuf {
        self.cache_root.join(key.file_name(&self.extension))
    }

    /// Returns the bytes stored for `key`, or None if there is no entry.
    pub async fn read(&self, key: &ContentKey) -> Result<Option<Bytes>> {
        let key = *key;
        self.run_blocking(move |tier| tier.read_impl(&key)).await
    }

    /// Atomically stores `data` under `key`, then runs an eviction pass.
    pub async fn write(&self, key: &ContentKey, data: Bytes) -> Result<()> {
        let key = *key;
        self.run_blocking(move |tier| tier.write_impl(&key, &data)).await
    }

    /// Sum of the sizes of all persisted entries.
    pub async fn total_size(&self) -> Result<u64> {
        self.run_blocking(|tier| tier.total_size_impl()).await
    }

    /// All persisted entries, oldest first.
    pub async fn entries(&self) -> Result<Vec<DiskEntry>> {
        self.run_blocking(|tier| {
            let mut entries = tier.list_entries()?;
            sort_for_eviction(&mut entries);
            Ok(entries)
        })
        .await
    }

    /// Deletes the entry for `key`. Returns false if there was none.
    pub async fn remove(&self, key: &ContentKey) -> Result<bool> {
        let key = *key;
        self.run_blocking(move |tier| remove_file(tier.entry_path(&key))).await
    }

    /// Deletes every persisted entry. Returns the number of entries deleted.
    pub async fn remove_all(&self) -> Result<usize> {
        self.run_blocking(|tier| tier.remove_all_impl()).await
    }

    pub async fn evict_if_over_budget(&self) -> Result<EvictionSummary> {
        self.run_blocking(|tier| tier.evict_if_over_budget_impl()).await
    }

    async fn run_blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DiskTier) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let tier = self.clone();
        tokio::task::spawn_blocking(move || f(&tier)).await?
    }

    fn read_impl(&self, key: &ContentKey) -> Result<Option<Bytes>> {
        match fs::read(self.entry_path(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_impl(&self, key: &ContentKey, data: &[u8]) -> Result<()> {
        let mut fw = SafeFileCreator::new(self.entry_path(key))?;
        fw.write_all(data)?;

        // a pass that listed the previous version of this entry must not delete the new one
        let _guard = self.eviction_lock.lock();
        fw.close()?;
        debug!("disk tier stored {key} ({} bytes)", data.len());

        self.evict_locked()?;
        Ok(())
    }

    fn total_size_impl(&self) -> Result<u64> {
        Ok(self.list_entries()?.iter().map(|e| e.size).sum())
    }

    fn evict_if_over_budget_impl(&self) -> Result<EvictionSummary> {
        // one pass at a time; a second pass sees the first one's result
        let _guard = self.eviction_lock.lock();
        self.evict_locked()
    }

    /// Must be called with `eviction_lock` held.
    fn evict_locked(&self) -> Result<EvictionSummary> {
        let mut entries = self.list_entries()?;
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let mut summary = EvictionSummary {
            total_before: total,
            total_after: total,
            ..Default::default()
        };

        if total <= self.max_bytes {
            return Ok(summary);
        }

        let target = self.low_water_target();
        sort_for_eviction(&mut entries);

        for entry in entries {
            if total <= target {
                break;
            }
            let removed = remove_file(self.entry_path(&entry.key))
                .warn_error(format!("failed to evict {}, skipping", entry.key));
            match removed {
                Ok(_) => {
                    total -= entry.size;
                    summary.bytes_freed += entry.size;
                    summary.evicted.push(entry.key);
                },
                Err(_) => summary.failed.push(entry.key),
            }
        }
        summary.total_after = total;

        info!(
            "disk tier eviction: removed {} entries ({} bytes), {} failed, size {} -> {} (budget {}, target {})",
            summary.evicted.len(),
            summary.bytes_freed,
            summary.failed.len(),
            summary.total_before,
            summary.total_after,
            self.max_bytes,
            target
        );
        if total > target {
            warn!("disk tier could not drain to its low water mark: {total} > {target}");
        }

        Ok(summary)
    }

    fn remove_all_impl(&self) -> Result<usize> {
        let _guard = self.eviction_lock.lock();

        let mut removed = 0;
        let mut first_error = None;
        for entry in self.list_entries()? {
            match remove_file(self.entry_path(&entry.key)).warn_error(format!("failed to remove {}", entry.key)) {
                Ok(true) => removed += 1,
                Ok(false) => {},
                Err(e) => {
                    first_error.get_or_insert(e);
                },
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Lists entries in no particular order. Files that are not cache entries are ignored,
    /// as are entries that vanish or cannot be inspected while listing.
    fn list_entries(&self) -> Result<Vec<DiskEntry>> {
        let Some(readdir) = read_dir(&self.cache_root)? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for item in readdir {
            let Some(entry) = self.try_parse_entry(item) else {
                continue;
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    fn try_parse_entry(&self, item: std::io::Result<DirEntry>) -> Option<DiskEntry> {
        let item = item.debug_error("failed to read cache directory entry").ok()?;
        let file_name = item.file_name();
        let key = ContentKey::from_file_name(file_name.to_str()?, &self.extension)?;

        let md = match item.metadata() {
            Ok(md) => md,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("failed to stat cache entry {:?}: {e}", item.path());
                }
                return None;
            },
        };
        if !md.is_file() {
            debug!("ignoring non-file {:?} in cache directory", item.path());
            return None;
        }

        Some(DiskEntry {
            key,
            size: md.len(),
            modified: md.modified().unwrap_or(UNIX_EPOCH),
        })
    }

    fn remove_stale_temp_files(&self) -> Result<usize> {
        let Some(readdir) = read_dir(&self.cache_root)? else {
            return Ok(0);
        };

        let mut removed = 0;
        for item in readdir {
            let Ok(item) = item else {
                continue;
            };
            if is_temp_file_name(&item.file_name()) && remove_file(item.path()).warn_error("failed to remove temporary file")? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn check_low_water_mark(low_water_mark: f64) -> Result<()> {
    if !(low_water_mark > 0. && low_water_mark <= 1.) {
        return Err(AssetCacheError::config(format!("low water mark must be in (0, 1], got {low_water_mark}")));
    }
    Ok(())
}

/// Oldest modification time first; equal times break ties by key.
fn sort_for_eviction(entries: &mut [DiskEntry]) {
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
}

/// Reads a directory, returning None if it does not exist.
fn read_dir(path: impl AsRef<Path>) -> Result<Option<fs::ReadDir>> {
    match fs::read_dir(path) {
        Ok(rd) => Ok(Some(rd)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file but disregards a "NotFound" error if the file is already gone.
/// Returns whether this call removed it.
fn remove_file(path: impl AsRef<Path>) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
