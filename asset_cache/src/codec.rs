use bytes::Bytes;

use crate::error::{AssetCacheError, Result};

/// Converts between the raw bytes kept on disk (and returned by a fetcher) and the decoded
/// asset handed to callers and kept in the memory tier.
///
/// Decoding runs on the blocking pool, so it may be CPU heavy.
pub trait AssetCodec: Send + Sync + 'static {
    type Asset: Send + Sync + 'static;

    fn decode(&self, data: Bytes) -> Result<Self::Asset>;

    /// The bytes persisted by the disk tier for `asset`.
    fn encode(&self, asset: &Self::Asset) -> Result<Bytes>;

    /// The weight charged against the memory tier's cost budget.
    fn cost(&self, asset: &Self::Asset) -> u64;
}

/// Keeps assets as their raw bytes. An empty payload is treated as undecodable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl AssetCodec for BytesCodec {
    type Asset = Bytes;

    fn decode(&self, data: Bytes) -> Result<Bytes> {
        if data.is_empty() {
            return Err(AssetCacheError::decode("empty payload"));
        }
        Ok(data)
    }

    fn encode(&self, asset: &Bytes) -> Result<Bytes> {
        Ok(asset.clone())
    }

    fn cost(&self, asset: &Bytes) -> u64 {
        asset.len() as u64
    }
}
