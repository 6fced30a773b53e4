//! Ordered write-behind staging area.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::map::ensure_same_len;
use crate::SdcError;

/// Cache slot key; register and field slots are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Register(String),
    Field(String),
}

impl CacheKey {
    pub fn uid(&self) -> &str {
        match self {
            CacheKey::Register(uid) | CacheKey::Field(uid) => uid,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Register(uid) => write!(f, "register {uid}"),
            CacheKey::Field(uid) => write!(f, "field {uid}"),
        }
    }
}

/// Position a re-written key takes in the flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    /// Keep the position of the first write and replace the value in place.
    #[default]
    FirstWrite,
    /// Move the key behind every other staged entry.
    LastWrite,
}

/// Insertion-ordered map of pending writes.
#[derive(Debug, Default)]
pub struct WriteBehindCache {
    entries: Vec<(CacheKey, u64)>,
    index: HashMap<CacheKey, usize>,
    policy: OrderPolicy,
}

impl WriteBehindCache {
    pub fn new(policy: OrderPolicy) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> OrderPolicy {
        self.policy
    }

    /// Stage a value for `key`.
    pub fn write(&mut self, key: CacheKey, value: u64) {
        debug!(key = %key, value, "stage cache entry");
        match (self.index.get(&key).copied(), self.policy) {
            (Some(position), OrderPolicy::FirstWrite) => {
                self.entries[position].1 = value;
            }
            (Some(position), OrderPolicy::LastWrite) => {
                self.entries.remove(position);
                self.entries.push((key, value));
                self.reindex();
            }
            (None, _) => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Stage parallel sequences of keys and values in order.
    pub fn write_multi(&mut self, keys: Vec<CacheKey>, values: &[u64]) -> Result<(), SdcError> {
        ensure_same_len(keys.len(), values.len())?;
        for (key, value) in keys.into_iter().zip(values) {
            self.write(key, *value);
        }
        Ok(())
    }

    /// Staged value for `key`; never consults the hardware.
    pub fn read(&self, key: &CacheKey) -> Result<u64, SdcError> {
        self.get(key)
            .ok_or_else(|| SdcError::CacheMiss(key.to_string()))
    }

    pub fn get(&self, key: &CacheKey) -> Option<u64> {
        self.index.get(key).map(|position| self.entries[*position].1)
    }

    /// Discard every staged entry.
    pub fn clear(&mut self) {
        debug!(discarded = self.entries.len(), "clear cache");
        self.entries.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged entries in flush order.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, u64)> {
        self.entries.iter().map(|(key, value)| (key, *value))
    }

    /// Apply every staged entry in order.
    ///
    /// On success the cache is empty. When entry `i` fails, entries before it
    /// are consumed, entry `i` and its successors stay staged in order and the
    /// error is reported as [`SdcError::FlushFailure`].
    pub fn flush<F>(&mut self, mut apply: F) -> Result<usize, SdcError>
    where
        F: FnMut(&CacheKey, u64) -> Result<(), SdcError>,
    {
        let total = self.entries.len();
        for position in 0..total {
            let (key, value) = &self.entries[position];
            if let Err(err) = apply(key, *value) {
                let key = key.to_string();
                warn!(index = position, key = %key, error = %err, "cache flush failed");
                self.entries.drain(..position);
                self.reindex();
                return Err(SdcError::FlushFailure {
                    index: position,
                    key,
                    source: Box::new(err),
                });
            }
        }
        self.entries.clear();
        self.index.clear();
        debug!(applied = total, "cache flushed");
        Ok(total)
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, (key, _))| (key.clone(), position))
            .collect();
    }
}
