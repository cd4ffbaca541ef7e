use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::AssetCacheError;

pub const CONTENT_KEY_LEN: usize = 32;
const HEX_LEN: usize = CONTENT_KEY_LEN * 2;

/// The storage key shared by both tiers: the SHA-256 digest of a resource identifier.
///
/// Rendered as 64 lowercase hex characters, which makes it safe to use as a file name on
/// case-insensitive filesystems and guarantees it never contains a path separator.
/// Ordering matches the ordering of the hex rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey([u8; CONTENT_KEY_LEN]);

/// Maps a resource identifier (usually a URL) to its content key.
pub fn derive_key(identifier: &str) -> ContentKey {
    ContentKey::derive(identifier)
}

impl ContentKey {
    pub fn derive(identifier: &str) -> Self {
        let digest = Sha256::digest(identifier.as_bytes());
        let mut bytes = [0u8; CONTENT_KEY_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        let mut s = String::with_capacity(HEX_LEN);
        for b in self.0 {
            s.push(hex_digit(b >> 4));
            s.push(hex_digit(b & 0xf));
        }
        s
    }

    pub fn from_hex(s: &str) -> Result<Self, AssetCacheError> {
        let bytes = s.as_bytes();
        if bytes.len() != HEX_LEN {
            return Err(AssetCacheError::InvalidKey(format!("expected {HEX_LEN} hex characters, got {s:?}")));
        }
        let mut out = [0u8; CONTENT_KEY_LEN];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let (Some(hi), Some(lo)) = (hex_value(pair[0]), hex_value(pair[1])) else {
                return Err(AssetCacheError::InvalidKey(format!("{s:?} is not lowercase hex")));
            };
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// The name of the disk entry for this key, e.g. `<hex>.jpg`.
    pub fn file_name(&self, extension: &str) -> String {
        if extension.is_empty() {
            self.hex()
        } else {
            format!("{}.{extension}", self.hex())
        }
    }

    /// Inverse of [`ContentKey::file_name`]; returns None for any name that is not a cache entry.
    pub fn from_file_name(file_name: &str, extension: &str) -> Option<Self> {
        let stem = if extension.is_empty() {
            file_name
        } else {
            file_name.strip_suffix(extension)?.strip_suffix('.')?
        };
        Self::from_hex(stem).ok()
    }
}

fn hex_digit(v: u8) -> char {
    char::from(b"0123456789abcdef"[v as usize])
}

// Uppercase is rejected so that a key has exactly one file name.
fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.hex())
    }
}

impl FromStr for ContentKey {
    type Err = AssetCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
