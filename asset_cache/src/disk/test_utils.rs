use std::fs::File;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rand::Rng;

use super::DiskTier;
use crate::key::ContentKey;

pub fn random_key() -> ContentKey {
    let mut rng = rand::rng();
    ContentKey::derive(&format!("https://example.com/{:016x}.jpg", rng.random::<u64>()))
}

pub fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    Bytes::from(data)
}

/// Overwrites the modification time of the entry for `key`.
pub fn set_modified(tier: &DiskTier, key: &ContentKey, time: SystemTime) {
    let file = File::options().write(true).open(tier.entry_path(key)).unwrap();
    file.set_modified(time).unwrap();
}

/// Moves the modification time of the entry for `key` `secs` seconds into the past.
pub fn backdate(tier: &DiskTier, key: &ContentKey, secs: u64) {
    set_modified(tier, key, SystemTime::now() - Duration::from_secs(secs));
}
