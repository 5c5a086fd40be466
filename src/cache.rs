use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::FormPayload;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

const FORM_KEY_PREFIX: &str = "form:";

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A cached answer: either the fetched value or a confirmed absence.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<V> {
    Present(V),
    Absent,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: Cached<V>,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Valid while strictly younger than `ttl`.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Key/value storage for cache entries. Expiry is decided by [`TtlCache`]
/// from the `fetched_at` stamp stored alongside each value.
#[async_trait]
pub trait CacheStore<V>: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheEntry<V>>;
    async fn set(&self, key: &str, entry: CacheEntry<V>);
    async fn delete(&self, key: &str);

    /// Deletes `key` only while it still holds the entry stamped `fetched_at`.
    /// Returns whether anything was removed.
    async fn delete_if_unchanged(&self, key: &str, fetched_at: Instant) -> bool;
}

pub struct InMemoryStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> CacheStore<V> for InMemoryStore<V> {
    async fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, entry: CacheEntry<V>) {
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn delete_if_unchanged(&self, key: &str, fetched_at: Instant) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.fetched_at == fetched_at => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }
}

pub struct TtlCache<V, S = InMemoryStore<V>, C = SystemClock> {
    store: S,
    clock: C,
    ttl: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V, S, C> TtlCache<V, S, C>
where
    S: CacheStore<V>,
    C: Clock,
{
    pub fn new(store: S, clock: C, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            _value: PhantomData,
        }
    }

    /// Returns the entry for `key` if it is still fresh. An expired entry is
    /// removed unless a newer one replaced it after it was read.
    pub async fn get(&self, key: &str) -> Option<Cached<V>> {
        let entry = self.store.get(key).await?;
        if entry.is_fresh(self.clock.now(), self.ttl) {
            return Some(entry.value);
        }

        let removed = self.store.delete_if_unchanged(key, entry.fetched_at).await;
        tracing::debug!(key, removed, "cache entry expired");
        None
    }

    pub async fn put(&self, key: &str, value: V) {
        self.store.set(key, self.stamp(Cached::Present(value))).await;
    }

    pub async fn put_absent(&self, key: &str) {
        self.store.set(key, self.stamp(Cached::Absent)).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.store.delete(key).await;
    }

    fn stamp(&self, value: Cached<V>) -> CacheEntry<V> {
        CacheEntry {
            value,
            fetched_at: self.clock.now(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("form does not exist")]
    NotFound,
    #[error("form lookup failed: {0}")]
    Transient(String),
}

#[async_trait]
pub trait FormFetcher: Send + Sync {
    async fn fetch(&self, form_id: &str) -> Result<FormPayload, FetchError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    #[error("form {0} not found")]
    NotFound(String),
    #[error("could not look up form {form_id}: {reason}")]
    Transient { form_id: String, reason: String },
}

/// Form metadata and faculty roster behind a TTL cache with negative
/// caching. Transient fetch failures are returned but never stored.
pub struct FormLookupCache<F, S = InMemoryStore<FormPayload>, C = SystemClock> {
    fetcher: F,
    cache: TtlCache<FormPayload, S, C>,
}

impl<F: FormFetcher> FormLookupCache<F> {
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self::with_parts(fetcher, InMemoryStore::default(), SystemClock, ttl)
    }
}

impl<F, S, C> FormLookupCache<F, S, C>
where
    F: FormFetcher,
    S: CacheStore<FormPayload>,
    C: Clock,
{
    pub fn with_parts(fetcher: F, store: S, clock: C, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: TtlCache::new(store, clock, ttl),
        }
    }

    pub async fn resolve(&self, form_id: &str) -> Result<FormPayload, LookupError> {
        let key = cache_key(form_id);

        match self.cache.get(&key).await {
            Some(Cached::Present(payload)) => {
                tracing::debug!(form_id, "form cache hit");
                return Ok(payload);
            }
            Some(Cached::Absent) => {
                tracing::debug!(form_id, "form negative cache hit");
                return Err(LookupError::NotFound(form_id.to_string()));
            }
            None => tracing::debug!(form_id, "form cache miss"),
        }

        match self.fetcher.fetch(form_id).await {
            Ok(payload) => {
                tracing::info!(form_id, faculties = payload.faculties.len(), "fetched form");
                self.cache.put(&key, payload.clone()).await;
                Ok(payload)
            }
            Err(FetchError::NotFound) => {
                tracing::info!(form_id, "form does not exist; caching negative result");
                self.cache.put_absent(&key).await;
                Err(LookupError::NotFound(form_id.to_string()))
            }
            Err(FetchError::Transient(reason)) => {
                tracing::warn!(form_id, error = %reason, "form lookup failed; not cached");
                Err(LookupError::Transient {
                    form_id: form_id.to_string(),
                    reason,
                })
            }
        }
    }

    pub async fn invalidate(&self, form_id: &str) {
        self.cache.invalidate(&cache_key(form_id)).await;
    }
}

fn cache_key(form_id: &str) -> String {
    format!("{FORM_KEY_PREFIX}{form_id}")
}
