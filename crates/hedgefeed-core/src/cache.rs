//! Call-signature keyed cache wrapped around capability calls.
//!
//! Keys are `"{capability}:{sha256}"` where the digest covers the canonical
//! JSON of the call's positional and keyword arguments. Keyword arguments
//! sit in a sorted map, so the order they were supplied in never changes the
//! key.
//!
//! Each stored value is an envelope carrying the declared return shape of
//! the capability, the expiry instant and the payload. An entry written
//! under a different shape is a miss and gets overwritten. An entry with the
//! right shape whose payload no longer decodes is a schema error.
//!
//! Backend failures never fail the wrapped call: a failed read is a miss and
//! a failed write leaves the result unstored.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Record;
use crate::{Capability, ProviderError, UtcDateTime};

/// Default lifetime of a cached capability result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// How a call interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a live entry if present, otherwise fetch and store.
    #[default]
    Use,
    /// Always fetch, then overwrite the entry.
    Refresh,
    /// Always fetch; neither read nor write.
    Bypass,
}

/// Failure reported by a cache backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cache backend error: {message}")]
pub struct CacheError {
    message: String,
}

impl CacheError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key-value store with per-entry expiry.
pub trait CacheBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Process-local backend; expired entries read as absent.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheBackend {
    inner: Arc<tokio::sync::RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries.
    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.inner
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let store = self.inner.read().await;
            Ok(store.get(key).and_then(|entry| {
                if Instant::now() <= entry.expires_at {
                    Some(entry.bytes.clone())
                } else {
                    None
                }
            }))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Ok(());
            }
            let expires_at = Instant::now() + ttl;
            self.inner.write().await.insert(
                key.to_owned(),
                StoredValue {
                    bytes: value,
                    expires_at,
                },
            );
            Ok(())
        })
    }
}

/// Arguments identifying one call, excluding the receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheArgs {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl CacheArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Stable text encoding: object keys sorted at every depth.
    pub fn canonical_json(&self) -> String {
        Value::Array(vec![
            Value::Array(self.positional.clone()),
            Value::Object(self.keyword.clone().into_iter().collect()),
        ])
        .to_string()
    }
}

pub fn cache_key(capability: Capability, args: &CacheArgs) -> String {
    let digest = Sha256::digest(args.canonical_json().as_bytes());
    format!("{}:{}", capability.as_str(), hex::encode(digest))
}

/// Value that can be stored under a statically known shape tag.
pub trait Cacheable: Serialize + DeserializeOwned + Send + 'static {
    fn shape() -> String;
}

impl<T: Record> Cacheable for Vec<T> {
    fn shape() -> String {
        format!("list<{}>", T::NAME)
    }
}

impl Cacheable for Option<f64> {
    fn shape() -> String {
        String::from("optional<number>")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    shape: String,
    expires_at_ms: i64,
    payload: Value,
}

enum Lookup<T> {
    Hit(T),
    Miss,
}

/// Cache wrapper applied around capability calls.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Option<Arc<dyn CacheBackend>>,
    default_ttl: Duration,
    mode: CacheMode,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
            default_ttl: DEFAULT_TTL,
            mode: CacheMode::Use,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheBackend::new()))
    }

    /// Layer that passes every call straight through.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            default_ttl: DEFAULT_TTL,
            mode: CacheMode::Bypass,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn mode(&self) -> CacheMode {
        self.mode
    }

    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Runs `call` behind the cache using the default TTL.
    pub async fn cached<T, F, Fut>(
        &self,
        capability: Capability,
        args: &CacheArgs,
        call: F,
    ) -> Result<T, ProviderError>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.cached_with_ttl(capability, args, self.default_ttl, call)
            .await
    }

    pub async fn cached_with_ttl<T, F, Fut>(
        &self,
        capability: Capability,
        args: &CacheArgs,
        ttl: Duration,
        call: F,
    ) -> Result<T, ProviderError>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let backend = match (&self.backend, self.mode) {
            (Some(backend), CacheMode::Use | CacheMode::Refresh) => backend,
            _ => return call().await,
        };

        let key = cache_key(capability, args);

        if self.mode == CacheMode::Use {
            if let Lookup::Hit(value) = self.lookup::<T>(backend.as_ref(), &key).await? {
                debug!(%capability, key = %key, "cache hit");
                return Ok(value);
            }
            debug!(%capability, key = %key, "cache miss");
        }

        let value = call().await?;
        self.store(backend.as_ref(), &key, &value, ttl).await?;
        Ok(value)
    }

    async fn lookup<T: Cacheable>(
        &self,
        backend: &dyn CacheBackend,
        key: &str,
    ) -> Result<Lookup<T>, ProviderError> {
        let bytes = match backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(Lookup::Miss),
            Err(error) => {
                warn!(key, %error, "cache read failed; treating as miss");
                return Ok(Lookup::Miss);
            }
        };

        let envelope: CacheEnvelope = serde_json::from_slice(&bytes)
            .map_err(|error| ProviderError::schema(format!("cache entry '{key}'"), error))?;

        let expected = T::shape();
        if envelope.shape != expected {
            warn!(
                key,
                stored = %envelope.shape,
                expected = %expected,
                "cache entry has a different shape; refetching"
            );
            return Ok(Lookup::Miss);
        }

        if envelope.expires_at_ms <= UtcDateTime::now().unix_millis() {
            debug!(key, "cache entry expired");
            return Ok(Lookup::Miss);
        }

        serde_json::from_value::<T>(envelope.payload)
            .map(Lookup::Hit)
            .map_err(|error| ProviderError::schema(format!("cache entry '{key}' ({expected})"), error))
    }

    async fn store<T: Cacheable>(
        &self,
        backend: &dyn CacheBackend,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), ProviderError> {
        let payload = serde_json::to_value(value)
            .map_err(|error| ProviderError::schema(format!("cache entry '{key}'"), error))?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = CacheEnvelope {
            shape: T::shape(),
            expires_at_ms: UtcDateTime::now().unix_millis().saturating_add(ttl_ms),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|error| ProviderError::schema(format!("cache entry '{key}'"), error))?;

        if let Err(error) = backend.set(key, bytes, ttl).await {
            warn!(key, %error, "cache write failed; result not stored");
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.backend.is_some())
            .field("default_ttl", &self.default_ttl)
            .field("mode", &self.mode)
            .finish()
    }
}
