//! Disk-persisted, content-addressed response cache (C2).
//!
//! Each validated agent response is stored as a JSON file named by the hex
//! SHA-256 of its [`CacheKey`], under a configurable root directory. A side
//! index (`index.json`) tracks byte size and access times so TTL sweeps and
//! LRU eviction never need to open every entry. Per-key locks collapse
//! concurrent fills for the same key into a single in-flight write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::llm::types::TokenUsage;

/// Content-addressed cache key. Embeds the schema identity so a signature's
/// own version bump invalidates previously-cached records automatically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    /// Build a key from the provider, model tier, the signature's versioned
    /// identifier, the rendered prompt, and the temperature. All five fields
    /// are mixed in so that, say, an Ollama/base-tier response and a
    /// Gemini/pro-tier response for the same prompt and schema never collide
    /// on the same cache entry.
    pub fn new(
        provider_name: &str,
        model_tier: &str,
        schema_identifier: &str,
        prompt: &str,
        temperature: f64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(provider_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(model_tier.as_bytes());
        hasher.update(b"\0");
        hasher.update(schema_identifier.as_bytes());
        hasher.update(b"\0");
        hasher.update(prompt.as_bytes());
        hasher.update(b"\0");
        hasher.update(temperature.to_bits().to_le_bytes());
        CacheKey(format!("{:x}", hasher.finalize()))
    }

    /// `{SignatureName}@{version}` as specified for schema-versioned keys.
    pub fn schema_identifier(signature_name: &str, version: u32) -> String {
        format!("{signature_name}@{version}")
    }

    fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..16.min(self.0.len())])
    }
}

/// A cached value's shape. The cache only stores serializable validated
/// records: scalars, lists, maps, or record dumps including list roots.
/// Anything else (e.g. a bare JSON null) is rejected with `CacheTypeError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
    Scalar(serde_json::Value),
    List(Vec<serde_json::Value>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl CacheValue {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Err(Error::cache_type("<unsupported null payload>")),
            serde_json::Value::Array(items) => Ok(Self::List(items)),
            serde_json::Value::Object(obj) => Ok(Self::Map(obj)),
            scalar => Ok(Self::Scalar(scalar)),
        }
    }

    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Scalar(v) => v,
            Self::List(items) => serde_json::Value::Array(items),
            Self::Map(obj) => serde_json::Value::Object(obj),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    value: CacheValue,
    tokens: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    byte_size: u64,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: HashMap<String, IndexEntry>,
}

impl IndexFile {
    fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.byte_size).sum()
    }
}

/// Aggregate cache statistics, updated on every `get`/`put`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub type_errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Disk-backed response cache, safe to share across concurrent tasks.
pub struct ResponseCache {
    root: PathBuf,
    ttl: Duration,
    byte_budget: u64,
    index: Mutex<IndexFile>,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    stats: Mutex<CacheStats>,
}

impl ResponseCache {
    /// Default TTL: 7 days. Default byte budget: 100 MB.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_limits(root, Duration::days(7), 100 * 1024 * 1024).await
    }

    pub async fn with_limits(
        root: impl Into<PathBuf>,
        ttl: Duration,
        byte_budget: u64,
    ) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::cache(format!("failed to create cache root: {e}")))?;

        let index = load_index(&root).await.unwrap_or_default();

        Ok(Self {
            root,
            ttl,
            byte_budget,
            index: Mutex::new(index),
            key_locks: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Acquire the per-key stampede lock so only one in-flight fill happens
    /// for a given `CacheKey` at a time. Callers should `get` again after
    /// acquiring the lock in case a sibling task already filled it.
    pub async fn lock_key(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Look up a cached value; returns `None` on miss or expiry.
    pub async fn get(&self, key: &CacheKey) -> Option<(serde_json::Value, TokenUsage)> {
        let hit = {
            let mut index = self.index.lock().await;
            match index.entries.get(&key.0).cloned() {
                Some(entry) if Utc::now() - entry.created_at <= self.ttl => {
                    if let Some(e) = index.entries.get_mut(&key.0) {
                        e.last_accessed_at = Utc::now();
                    }
                    true
                }
                Some(_) => {
                    index.entries.remove(&key.0);
                    false
                }
                None => false,
            }
        };

        if !hit {
            self.stats.lock().await.misses += 1;
            return None;
        }

        match self.read_record(key).await {
            Ok(record) => {
                self.stats.lock().await.hits += 1;
                Some((record.value.into_json(), record.tokens))
            }
            Err(_) => {
                self.stats.lock().await.misses += 1;
                None
            }
        }
    }

    /// Store a validated record. Degrades to a no-op (returning
    /// `Err(Error::CacheType)`) when `value` isn't a supported shape — the
    /// caller should treat that as "no-cache for this request" rather than
    /// propagate it as a hard failure.
    pub async fn put(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        tokens: TokenUsage,
    ) -> Result<()> {
        let cache_value = match CacheValue::from_json(value) {
            Ok(v) => v,
            Err(e) => {
                self.stats.lock().await.type_errors += 1;
                return Err(e);
            }
        };

        let record = CacheRecord {
            value: cache_value,
            tokens,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| Error::cache(format!("failed to serialize cache record: {e}")))?;

        let path = self.root.join(key.file_name());
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::cache(format!("failed to write cache entry: {e}")))?;

        {
            let mut index = self.index.lock().await;
            let now = Utc::now();
            index.entries.insert(
                key.0.clone(),
                IndexEntry {
                    byte_size: bytes.len() as u64,
                    created_at: now,
                    last_accessed_at: now,
                },
            );
        }

        self.evict_if_over_budget().await;
        self.persist_index().await?;
        Ok(())
    }

    async fn read_record(&self, key: &CacheKey) -> Result<CacheRecord> {
        let path = self.root.join(key.file_name());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::cache(format!("failed to read cache entry: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::cache(format!("failed to deserialize cache entry: {e}")))
    }

    /// Evict least-recently-used entries until under `byte_budget`.
    async fn evict_if_over_budget(&self) {
        let mut index = self.index.lock().await;
        if index.total_bytes() <= self.byte_budget {
            return;
        }

        let mut by_access: Vec<(String, DateTime<Utc>)> = index
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed_at))
            .collect();
        by_access.sort_by_key(|(_, accessed)| *accessed);

        let mut evicted = 0u64;
        for (key_str, _) in by_access {
            if index.total_bytes() <= self.byte_budget {
                break;
            }
            index.entries.remove(&key_str);
            let _ = tokio::fs::remove_file(self.root.join(format!("{key_str}.json"))).await;
            evicted += 1;
        }
        drop(index);
        if evicted > 0 {
            self.stats.lock().await.evictions += evicted;
        }
    }

    /// Remove entries past their TTL without regard to the byte budget.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let mut index = self.index.lock().await;
        let now = Utc::now();
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| now - e.created_at > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();

        for key_str in &expired {
            index.entries.remove(key_str);
            let _ = tokio::fs::remove_file(self.root.join(format!("{key_str}.json"))).await;
        }
        let count = expired.len() as u64;
        drop(index);
        self.persist_index().await?;
        Ok(count)
    }

    async fn persist_index(&self) -> Result<()> {
        let index = self.index.lock().await;
        let bytes = serde_json::to_vec_pretty(&*index)
            .map_err(|e| Error::cache(format!("failed to serialize cache index: {e}")))?;
        tokio::fs::write(self.root.join("index.json"), bytes)
            .await
            .map_err(|e| Error::cache(format!("failed to persist cache index: {e}")))
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }
}

async fn load_index(root: &Path) -> Result<IndexFile> {
    let bytes = tokio::fs::read(root.join("index.json"))
        .await
        .map_err(|e| Error::cache(format!("no existing index: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::cache(format!("corrupt cache index: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_value_and_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path()).await.unwrap();

        let key = CacheKey::new("ollama", "balanced", "Critic@1", "evaluate this idea", 0.7);
        let value = serde_json::json!({"score": 8.0, "comment": "solid"});
        let tokens = TokenUsage {
            input_tokens: 120,
            output_tokens: 40,
            ..Default::default()
        };

        cache.put(key.clone(), value.clone(), tokens.clone()).await.unwrap();
        let (got_value, got_tokens) = cache.get(&key).await.unwrap();

        assert_eq!(got_value, value);
        assert_eq!(got_tokens.input_tokens, 120);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path()).await.unwrap();

        let key = CacheKey::new("ollama", "balanced", "Critic@1", "never cached", 0.7);
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn null_value_is_rejected_with_cache_type_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path()).await.unwrap();

        let key = CacheKey::new("ollama", "balanced", "Critic@1", "bad payload", 0.7);
        let err = cache
            .put(key, serde_json::Value::Null, TokenUsage::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CacheType { .. }));
        assert_eq!(cache.stats().await.type_errors, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::with_limits(dir.path(), Duration::zero(), 100 * 1024 * 1024)
            .await
            .unwrap();

        let key = CacheKey::new("ollama", "balanced", "Critic@1", "expires immediately", 0.7);
        cache
            .put(key.clone(), serde_json::json!({"score": 1.0}), TokenUsage::default())
            .await
            .unwrap();

        assert!(cache.get(&key).await.is_none());
        let swept = cache.sweep_expired().await.unwrap();
        assert_eq!(swept, 1);
    }

    #[tokio::test]
    async fn byte_budget_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::with_limits(dir.path(), Duration::days(7), 10).await.unwrap();

        let key1 = CacheKey::new("ollama", "balanced", "Critic@1", "first", 0.7);
        let key2 = CacheKey::new("ollama", "balanced", "Critic@1", "second", 0.7);

        cache
            .put(key1.clone(), serde_json::json!({"score": 1.0}), TokenUsage::default())
            .await
            .unwrap();
        cache
            .put(key2.clone(), serde_json::json!({"score": 2.0}), TokenUsage::default())
            .await
            .unwrap();

        assert!(cache.stats().await.evictions >= 1);
    }

    #[test]
    fn schema_identifier_embeds_name_and_version() {
        assert_eq!(CacheKey::schema_identifier("Critic", 1), "Critic@1");
    }

    #[test]
    fn cache_key_changes_with_temperature() {
        let a = CacheKey::new("ollama", "balanced", "Critic@1", "same prompt", 0.0);
        let b = CacheKey::new("ollama", "balanced", "Critic@1", "same prompt", 0.7);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_changes_with_provider_and_model_tier() {
        let ollama_base = CacheKey::new("ollama", "balanced", "Critic@1", "same prompt", 0.7);
        let gemini_pro = CacheKey::new("gemini", "flagship", "Critic@1", "same prompt", 0.7);
        assert_ne!(ollama_base, gemini_pro);

        let same_provider_different_tier =
            CacheKey::new("ollama", "flagship", "Critic@1", "same prompt", 0.7);
        assert_ne!(ollama_base, same_provider_different_tier);
    }
}
