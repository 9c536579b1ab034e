use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

/// In-process key-value store. Keys expire lazily: an expired entry is
/// removed the next time it is touched. State is per-process and lost on
/// restart, which is acceptable for rate-limit counters and cached sessions.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::milliseconds(ttl.as_millis() as i64)
}

/// `*`-wildcard match, where `*` matches any run of characters.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !key.starts_with(first) {
        return false;
    }
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        // No wildcard at all: exact match only.
        return key.len() == first.len();
    }

    let mut pos = first.len();
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };
    for part in middle {
        if part.is_empty() {
            continue;
        }
        match key[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }
    last.is_empty() || (key.len() >= pos + last.len() && key[pos..].ends_with(last))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(deadline),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(entry) if entry.is_expired() => None,
            Some(entry) => Some(entry.clone()),
            None => None,
        };
        let (count, expires_at) = match current {
            Some(entry) => {
                let value: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::NotACounter(key.to_string()))?;
                (value + 1, entry.expires_at)
            }
            None => (1, None),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(deadline(ttl));
        }
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let matching: Vec<String> = entries
            .keys()
            .filter(|key| pattern_matches(pattern, key))
            .cloned()
            .collect();
        let count = matching.len() as u64;
        for key in matching {
            entries.remove(&key);
        }
        Ok(count)
    }
}
