mod cache;
pub mod codec;
pub mod config;
pub mod disk;
pub mod error;
pub mod fetch;
pub mod key;
pub mod memory;

pub use cache::AssetCache;
pub use codec::{AssetCodec, BytesCodec};
pub use config::{CacheBudget, CacheConfig};
pub use disk::{DiskEntry, DiskTier, EvictionSummary};
pub use error::{AssetCacheError, FetchError};
pub use fetch::{AssetFetcher, HttpFetcher};
pub use key::{derive_key, ContentKey};
pub use memory::{MemoryStats, MemoryTier};
