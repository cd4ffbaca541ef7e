use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asset_cache::{derive_key, AssetCache, AssetFetcher, BytesCodec, CacheBudget, CacheConfig, FetchError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

/// Serves `body of <identifier>` for every identifier except those marked as failing.
#[derive(Default)]
struct CountingFetcher {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl CountingFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn fail(&self, identifier: &str) {
        self.failing.lock().insert(identifier.to_owned());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for CountingFetcher {
    async fn fetch(&self, identifier: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(identifier) {
            return Err(FetchError::Status {
                identifier: identifier.to_owned(),
                status: 503,
            });
        }
        Ok(Bytes::from(format!("body of {identifier}")))
    }
}

fn open(dir: &TempDir, fetcher: Arc<CountingFetcher>) -> AssetCache<BytesCodec> {
    AssetCache::new(&CacheConfig::new(dir.path()), fetcher, BytesCodec).unwrap()
}

const URL: &str = "https://cdn.example.com/venues/17/cover.jpg";

#[tokio::test]
async fn test_cold_load_fetches_once() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open(&dir, fetcher.clone());

    let first = cache.load_asset(URL).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(&first[..], format!("body of {URL}").as_bytes());

    let second = cache.load_asset(URL).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first, second);

    // both tiers were backfilled
    assert!(cache.memory().contains(&derive_key(URL)));
    assert_eq!(cache.disk_usage().await.unwrap(), first.len() as u64);
}

#[tokio::test]
async fn test_fetch_failure_leaves_tiers_empty() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    fetcher.fail(URL);
    let cache = open(&dir, fetcher.clone());

    assert!(cache.load_asset(URL).await.is_none());
    assert!(!cache.memory().contains(&derive_key(URL)));
    assert!(cache.disk().read(&derive_key(URL)).await.unwrap().is_none());
    assert_eq!(cache.disk_usage().await.unwrap(), 0);

    // failures are not cached: the next load asks again
    assert!(cache.load_asset(URL).await.is_none());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_disk_hit_after_restart() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    {
        let cache = open(&dir, fetcher.clone());
        cache.load_asset(URL).await.unwrap();
    }

    let cache = open(&dir, fetcher.clone());
    assert!(!cache.memory().contains(&derive_key(URL)));
    let asset = cache.load_asset(URL).await.unwrap();
    assert_eq!(&asset[..], format!("body of {URL}").as_bytes());
    assert_eq!(fetcher.calls(), 1);
    // the disk hit backfilled memory
    assert!(cache.memory().contains(&derive_key(URL)));
}

#[tokio::test]
async fn test_clear_all_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open(&dir, fetcher.clone());
    for i in 0..5 {
        cache.load_asset(&format!("https://example.com/{i}.jpg")).await.unwrap();
    }
    assert!(cache.disk_usage().await.unwrap() > 0);

    cache.clear_all().await.unwrap();
    assert_eq!(cache.disk_usage().await.unwrap(), 0);
    assert_eq!(cache.memory_stats().num_items, 0);
    assert_eq!(cache.memory_stats().total_cost, 0);

    cache.clear_all().await.unwrap();
    assert_eq!(cache.disk_usage().await.unwrap(), 0);

    // cleared content is fetched again
    cache.load_asset("https://example.com/0.jpg").await.unwrap();
    assert_eq!(fetcher.calls(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_are_coalesced() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(100)));
    let cache = open(&dir, fetcher.clone());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load_asset(URL).await })
        })
        .collect();

    for handle in handles {
        let asset = handle.await.unwrap().unwrap();
        assert_eq!(&asset[..], format!("body of {URL}").as_bytes());
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_load_still_backfills() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(50)));
    let cache = open(&dir, fetcher.clone());

    let handle = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.load_asset(URL).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.abort();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(cache.memory().contains(&derive_key(URL)));
    assert!(cache.disk_usage().await.unwrap() > 0);

    cache.load_asset(URL).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_disk_budget_holds_across_loads() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let budget = CacheBudget {
        memory_max_entries: 4,
        memory_max_cost: 1 << 20,
        disk_max_bytes: 1000,
        low_water_mark: 0.8,
    };
    let config = CacheConfig::new(dir.path()).with_budget(budget);
    let cache = AssetCache::new(&config, fetcher.clone(), BytesCodec).unwrap();

    for i in 0..100 {
        cache.load_asset(&format!("https://example.com/assets/{i:04}.jpg")).await.unwrap();
        assert!(cache.disk_usage().await.unwrap() <= 1000);
        assert!(cache.memory_stats().num_items <= 4);
    }
}
