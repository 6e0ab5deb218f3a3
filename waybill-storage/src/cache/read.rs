//! Lookup result carrying where the value came from.

/// Where a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Decoded from the cache hash.
    Cache,
    /// Assembled from relational storage after a miss.
    Storage,
}

/// Result of a cache-aside lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// Wrap a value decoded from the cache.
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
        }
    }

    /// Wrap a value fetched from storage on a miss.
    pub fn from_storage(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Storage,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        self.source == ReadSource::Storage
    }
}
