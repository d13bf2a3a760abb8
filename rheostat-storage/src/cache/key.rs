//! Cache keys.
//!
//! A [`CacheKey`] is the per-owner key of a cached row set
//! (`"{prefix}{identity}"`). Keys can't be blank, so two owners can never
//! collide on the empty key.

use rheostat_core::{CacheError, CacheResult};

/// Format version byte written in front of every encoded key.
const KEY_VERSION: u8 = 0x01;

/// A validated, non-blank cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a cache key, rejecting blank input.
    pub fn new(key: impl Into<String>) -> CacheResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CacheError::Backend {
                reason: "cache key must not be blank".to_string(),
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode the key for byte-keyed stores.
    ///
    /// # Binary Format
    ///
    /// - Byte 0: format version
    /// - Bytes 1..: UTF-8 key
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.0.len());
        bytes.push(KEY_VERSION);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes
    }

    /// Decode a key produced by [`CacheKey::encode`].
    pub fn decode(bytes: &[u8]) -> CacheResult<Self> {
        match bytes.split_first() {
            Some((&KEY_VERSION, rest)) => {
                let key = std::str::from_utf8(rest).map_err(|e| CacheError::Deserialization {
                    reason: e.to_string(),
                })?;
                Self::new(key)
            }
            Some((version, _)) => Err(CacheError::Deserialization {
                reason: format!("unknown cache key version {version}"),
            }),
            None => Err(CacheError::Deserialization {
                reason: "empty cache key".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
