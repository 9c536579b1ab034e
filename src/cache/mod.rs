//! Key-value layer backing the session cache and the rate limiter.
//!
//! The backend sits behind [`KeyValueStore`] so components receive it as an
//! injected dependency and tests can substitute their own implementation.
//! [`CacheClient`] is the fail-open wrapper: backend errors degrade to a miss
//! or no-op instead of failing the request.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key-value backend unavailable: {0}")]
    Backend(String),

    #[error("non-numeric counter value for key {0}")]
    NotACounter(String),
}

/// Minimal key-value contract: string values, optional TTLs, and the atomic
/// counter primitive the rate limiter relies on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Increment the integer value at `key`, creating it at 1. Any TTL already
    /// on the key is preserved.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    /// Set or replace the TTL on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
    /// Delete every key matching a `*`-wildcard pattern; returns the count.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError>;
}

/// Fail-open cache wrapper. Every operation catches backend errors, logs
/// them, and returns a miss/no-op so cache unavailability never fails a
/// request. Cached data may be silently lost on backend restart.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
    session_ttl: Duration,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KeyValueStore>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("cache get failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        match self.store.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!("cache set failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("cache delete failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("cache exists failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Bulk invalidation by `*`-wildcard pattern, e.g. `"patients:*"`.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        match self.store.delete_pattern(pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!("cache pattern invalidation failed for {}: {}", pattern, e);
                0
            }
        }
    }

    pub async fn set_session<T: Serialize>(&self, session_id: &str, data: &T) -> bool {
        let payload = match serde_json::to_string(data) {
            Ok(json) => json,
            Err(e) => {
                warn!("session serialization failed for {}: {}", session_id, e);
                return false;
            }
        };
        self.set(
            &format!("session:{}", session_id),
            &payload,
            Some(self.session_ttl),
        )
        .await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        let payload = self.get(&format!("session:{}", session_id)).await?;
        match serde_json::from_str(&payload) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("session deserialization failed for {}: {}", session_id, e);
                None
            }
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.delete(&format!("session:{}", session_id)).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A store whose backend is permanently down, for fail-open tests.
    pub struct FaultyStore;

    #[async_trait]
    impl KeyValueStore for FaultyStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }
}
