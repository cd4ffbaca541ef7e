use std::sync::Arc;

use bytes::Bytes;
use error_printer::ErrorPrinter;
use tracing::{debug, info, warn};
use utils::singleflight::Group;

use crate::codec::{AssetCodec, BytesCodec};
use crate::config::CacheConfig;
use crate::disk::DiskTier;
use crate::error::Result;
use crate::fetch::{AssetFetcher, HttpFetcher};
use crate::key::{derive_key, ContentKey};
use crate::memory::{MemoryStats, MemoryTier};

/// Read-through two-tier cache: memory, then disk, then the fetcher.
///
/// The handle is cheap to clone; clones share the same tiers. Concurrent loads of the same
/// identifier share one lookup, which runs as its own task: a caller that stops waiting does
/// not cancel the fetch or the backfill.
pub struct AssetCache<C: AssetCodec> {
    inner: Arc<CacheInner<C>>,
}

impl<C: AssetCodec> Clone for AssetCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct CacheInner<C: AssetCodec> {
    memory: MemoryTier<C::Asset>,
    disk: DiskTier,
    fetcher: Arc<dyn AssetFetcher>,
    codec: Arc<C>,
    in_flight: Group<ContentKey, Option<Arc<C::Asset>>>,
}

impl AssetCache<BytesCodec> {
    /// A raw-bytes cache backed by [`HttpFetcher`] configured from the environment.
    pub fn with_http(config: &CacheConfig) -> Result<Self> {
        Self::new(config, Arc::new(HttpFetcher::from_env()?), BytesCodec)
    }
}

impl<C: AssetCodec> AssetCache<C> {
    /// Opens the disk tier at `config.cache_directory`, creating it if needed.
    pub fn new(config: &CacheConfig, fetcher: Arc<dyn AssetFetcher>, codec: C) -> Result<Self> {
        config.validate()?;
        let budget = &config.budget;

        let disk = DiskTier::initialize(
            &config.cache_directory,
            &config.file_extension,
            budget.disk_max_bytes,
            budget.low_water_mark,
        )?;
        info!(
            "asset cache at {:?}: memory {} entries / {} bytes, disk {} bytes (low water mark {})",
            config.cache_directory,
            budget.memory_max_entries,
            budget.memory_max_cost,
            budget.disk_max_bytes,
            budget.low_water_mark
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                memory: MemoryTier::new(budget.memory_max_entries, budget.memory_max_cost),
                disk,
                fetcher,
                codec: Arc::new(codec),
                in_flight: Group::new(),
            }),
        })
    }

    /// Returns the asset for `identifier`, or None if it is not cached and cannot be fetched
    /// and decoded. Failures are logged, never returned.
    pub async fn load_asset(&self, identifier: &str) -> Option<Arc<C::Asset>> {
        self.try_load_asset(identifier)
            .await
            .log_error("asset load did not complete")
            .ok()
            .flatten()
    }

    /// Like [`AssetCache::load_asset`], but reports a load that ended without a result (its
    /// task panicked or the runtime is shutting down) as an error instead of absence.
    pub async fn try_load_asset(&self, identifier: &str) -> Result<Option<Arc<C::Asset>>> {
        let key = derive_key(identifier);

        if let Some(asset) = self.inner.memory.get(&key) {
            debug!("memory hit for {key}");
            return Ok(Some(asset));
        }

        let inner = self.inner.clone();
        let identifier = identifier.to_owned();
        let asset = self
            .inner
            .in_flight
            .work(key, async move { inner.load_miss(key, &identifier).await })
            .await?;
        Ok(asset)
    }

    /// Empties both tiers. Loads already in flight may repopulate them afterwards.
    pub async fn clear_all(&self) -> Result<()> {
        self.inner.memory.remove_all();
        let removed = self.inner.disk.remove_all().await?;
        info!("cleared asset cache ({removed} disk entries)");
        Ok(())
    }

    /// Total bytes held by the disk tier.
    pub async fn disk_usage(&self) -> Result<u64> {
        self.inner.disk.total_size().await
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.inner.memory.stats()
    }

    pub fn memory(&self) -> &MemoryTier<C::Asset> {
        &self.inner.memory
    }

    pub fn disk(&self) -> &DiskTier {
        &self.inner.disk
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }
}

impl<C: AssetCodec> CacheInner<C> {
    async fn load_miss(&self, key: ContentKey, identifier: &str) -> Option<Arc<C::Asset>> {
        if let Some(asset) = self.load_from_disk(key).await {
            return Some(asset);
        }

        let data = self
            .fetcher
            .fetch(identifier)
            .await
            .info_error(format!("failed to fetch {identifier}"))
            .ok()?;

        let asset = self
            .with_codec(move |codec| codec.decode(data))
            .await
            .warn_error(format!("failed to decode fetched {identifier}"))
            .ok()?;
        let asset = Arc::new(asset);
        self.memory.put(key, asset.clone(), self.codec.cost(&asset));

        // the disk tier is best effort: the caller still gets the asset
        let encoded = {
            let asset = asset.clone();
            self.with_codec(move |codec| codec.encode(&asset)).await
        };
        if let Ok(data) = encoded.warn_error(format!("failed to encode {key} for disk")) {
            let _ = self.disk.write(&key, data).await.warn_error(format!("failed to persist {key}"));
        }

        debug!("fetched and cached {identifier} as {key}");
        Some(asset)
    }

    async fn load_from_disk(&self, key: ContentKey) -> Option<Arc<C::Asset>> {
        let data: Bytes = self
            .disk
            .read(&key)
            .await
            .warn_error(format!("disk read failed for {key}, treating as a miss"))
            .ok()
            .flatten()?;

        match self.with_codec(move |codec| codec.decode(data)).await {
            Ok(asset) => {
                debug!("disk hit for {key}");
                let asset = Arc::new(asset);
                self.memory.put(key, asset.clone(), self.codec.cost(&asset));
                Some(asset)
            },
            Err(e) => {
                warn!("disk entry {key} failed to decode ({e}), removing it and refetching");
                let _ = self.disk.remove(&key).await.log_error(format!("failed to remove disk entry {key}"));
                None
            },
        }
    }

    async fn with_codec<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&C) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || f(&codec)).await?
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;
    use utils::singleflight::SingleflightError;

    use super::*;
    use crate::error::{AssetCacheError, FetchError};

    struct StaticFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetFetcher for StaticFetcher {
        async fn fetch(&self, identifier: &str) -> std::result::Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(format!("body of {identifier}")))
        }
    }

    fn new_cache(dir: &TempDir) -> (AssetCache<BytesCodec>, Arc<StaticFetcher>) {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = AssetCache::new(&CacheConfig::new(dir.path()), fetcher.clone(), BytesCodec).unwrap();
        (cache, fetcher)
    }

    #[tokio::test]
    async fn test_suspect_disk_entry_is_replaced() {
        let dir = TempDir::new().unwrap();
        let (cache, fetcher) = new_cache(&dir);
        let key = derive_key("https://example.com/a.jpg");
        // an empty entry does not decode with BytesCodec
        fs::write(cache.disk().entry_path(&key), b"").unwrap();

        let asset = cache.load_asset("https://example.com/a.jpg").await.unwrap();
        assert_eq!(&asset[..], b"body of https://example.com/a.jpg");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // the refetched bytes replaced the suspect entry
        assert_eq!(fs::read(cache.disk().entry_path(&key)).unwrap(), asset.to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_disk_read_error_is_treated_as_miss() {
        let dir = TempDir::new().unwrap();
        let (cache, fetcher) = new_cache(&dir);
        let key = derive_key("https://example.com/b.jpg");
        fs::create_dir(cache.disk().entry_path(&key)).unwrap();

        assert!(cache.load_asset("https://example.com/b.jpg").await.is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        // the asset is still served from memory
        assert!(cache.memory().contains(&key));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let dir = TempDir::new().unwrap();
        let (cache, fetcher) = new_cache(&dir);
        let other = cache.clone();

        cache.load_asset("https://example.com/c.jpg").await.unwrap();
        other.load_asset("https://example.com/c.jpg").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(other.memory_stats().hits, 1);
    }

    /// Decodes like [`BytesCodec`] but cannot price an asset.
    struct UnpricedCodec;

    impl AssetCodec for UnpricedCodec {
        type Asset = Bytes;

        fn decode(&self, data: Bytes) -> Result<Bytes> {
            Ok(data)
        }

        fn encode(&self, asset: &Bytes) -> Result<Bytes> {
            Ok(asset.clone())
        }

        fn cost(&self, _asset: &Bytes) -> u64 {
            panic!("cost is not available");
        }
    }

    #[tokio::test]
    async fn test_load_without_result_is_a_singleflight_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = AssetCache::new(&CacheConfig::new(dir.path()), fetcher, UnpricedCodec).unwrap();

        let result = cache.try_load_asset("https://example.com/d.jpg").await;
        assert!(
            matches!(result, Err(AssetCacheError::Singleflight(SingleflightError::NoResult))),
            "{result:?}"
        );
        assert!(cache.load_asset("https://example.com/d.jpg").await.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = CacheConfig::new(dir.path());
        config.budget.low_water_mark = 2.;
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        assert!(AssetCache::new(&config, fetcher, BytesCodec).is_err());
    }
}
