//! Ephemeral in-process cache.
//!
//! An LRU over read-mostly snapshots: user meta, diff-session handles, and
//! bare collection hashes. Every writer must call `clear_user` so the next
//! `check` cannot serve a stale snapshot; entries also carry their own
//! deadline so even an unevicted snapshot goes stale on schedule.

use frkb_core::config::CacheConfig;
use frkb_core::UserKey;
use frkb_metadata::models::{DiffSessionRow, UserMetaRow};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone)]
enum CachedValue {
    Meta(Arc<UserMetaRow>),
    Session(Arc<DiffSessionRow>),
    Hash(String),
}

struct Entry {
    value: CachedValue,
    deadline: Instant,
}

/// Hit/miss/eviction counters, readable at any time.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
}

/// Process-local LRU cache. Disabled configuration turns every operation
/// into a no-op.
pub struct EphemeralCache {
    inner: Option<Mutex<LruCache<String, Entry>>>,
    meta_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl EphemeralCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = if config.enabled {
            let capacity = NonZeroUsize::new(config.max_entries)
                .unwrap_or_else(|| NonZeroUsize::new(10_000).expect("10000 > 0"));
            Some(Mutex::new(LruCache::new(capacity)))
        } else {
            None
        };
        Self {
            inner,
            meta_ttl: config.meta_ttl(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn meta_key(user: UserKey) -> String {
        format!("user_meta:{}", user.short())
    }

    fn session_key(session_id: &str) -> String {
        format!("diff_session:{session_id}")
    }

    fn hash_key(user: UserKey) -> String {
        format!("collection_hash:{}", user.short())
    }

    fn get(&self, key: &str) -> Option<CachedValue> {
        let inner = self.inner.as_ref()?;
        let mut cache = inner.lock().expect("ephemeral cache poisoned");
        let expired = match cache.get(key) {
            Some(entry) if entry.deadline > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            // Expired in place; drop it so the slot frees up.
            cache.pop(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: String, value: CachedValue, ttl: Duration) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut cache = inner.lock().expect("ephemeral cache poisoned");
        if cache.len() == usize::from(cache.cap()) && !cache.contains(&key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(
            key,
            Entry {
                value,
                deadline: Instant::now() + ttl,
            },
        );
    }

    /// Cached meta snapshot for a user.
    pub fn get_meta(&self, user: UserKey) -> Option<Arc<UserMetaRow>> {
        match self.get(&Self::meta_key(user)) {
            Some(CachedValue::Meta(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn put_meta(&self, user: UserKey, meta: UserMetaRow) {
        self.put(
            Self::meta_key(user),
            CachedValue::Meta(Arc::new(meta)),
            self.meta_ttl,
        );
    }

    /// Cached diff-session handle.
    pub fn get_session(&self, session_id: &str) -> Option<Arc<DiffSessionRow>> {
        match self.get(&Self::session_key(session_id)) {
            Some(CachedValue::Session(session)) => Some(session),
            _ => None,
        }
    }

    /// Cache a session handle for however long the session itself has left.
    pub fn put_session(&self, session: DiffSessionRow, remaining_ttl: Duration) {
        if remaining_ttl.is_zero() {
            return;
        }
        self.put(
            Self::session_key(&session.session_id),
            CachedValue::Session(Arc::new(session)),
            remaining_ttl,
        );
    }

    pub fn get_collection_hash(&self, user: UserKey) -> Option<String> {
        match self.get(&Self::hash_key(user)) {
            Some(CachedValue::Hash(hash)) => Some(hash),
            _ => None,
        }
    }

    pub fn put_collection_hash(&self, user: UserKey, hash: String) {
        self.put(Self::hash_key(user), CachedValue::Hash(hash), self.meta_ttl);
    }

    /// Drop every cached entry derived from this user: the meta and hash
    /// snapshots plus any of their diff-session handles.
    pub fn clear_user(&self, user: UserKey) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut cache = inner.lock().expect("ephemeral cache poisoned");
        cache.pop(&Self::meta_key(user));
        cache.pop(&Self::hash_key(user));

        let user_uuid = user.as_uuid();
        let session_keys: Vec<String> = cache
            .iter()
            .filter_map(|(key, entry)| match &entry.value {
                CachedValue::Session(session) if session.user_key == user_uuid => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        for key in session_keys {
            cache.pop(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .inner
            .as_ref()
            .map(|inner| inner.lock().expect("ephemeral cache poisoned").len() as u64)
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn meta_row(user: UserKey, count: i64) -> UserMetaRow {
        let now = OffsetDateTime::now_utc();
        UserMetaRow {
            user_key: user.as_uuid(),
            total_count: count,
            collection_hash: String::new(),
            last_sync_at: None,
            total_syncs: 0,
            last_sync_added: 0,
            last_sync_duration_ms: 0,
            bloom_filter: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn session_row(user: UserKey, id: &str) -> DiffSessionRow {
        let now = OffsetDateTime::now_utc();
        DiffSessionRow {
            session_id: id.to_string(),
            user_key: user.as_uuid(),
            missing_in_client: "[]".to_string(),
            missing_in_server: "[]".to_string(),
            sorted_missing_in_client: None,
            total_client: 0,
            total_server: 0,
            created_at: now,
            expires_at: now + time::Duration::seconds(300),
        }
    }

    fn cache_config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            max_entries,
            meta_ttl_secs: 3600,
        }
    }

    #[test]
    fn meta_roundtrip_counts_hits_and_misses() {
        let cache = EphemeralCache::new(&cache_config(16));
        let user = UserKey::generate();

        assert!(cache.get_meta(user).is_none());
        cache.put_meta(user, meta_row(user, 5));
        assert_eq!(cache.get_meta(user).unwrap().total_count, 5);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn clear_user_drops_meta_hash_and_sessions() {
        let cache = EphemeralCache::new(&cache_config(16));
        let user = UserKey::generate();
        let other = UserKey::generate();

        cache.put_meta(user, meta_row(user, 1));
        cache.put_collection_hash(user, "abc".to_string());
        cache.put_session(session_row(user, "diff_1_a"), Duration::from_secs(60));
        cache.put_session(session_row(other, "diff_2_b"), Duration::from_secs(60));

        cache.clear_user(user);

        assert!(cache.get_meta(user).is_none());
        assert!(cache.get_collection_hash(user).is_none());
        assert!(cache.get_session("diff_1_a").is_none());
        assert!(cache.get_session("diff_2_b").is_some());
    }

    #[test]
    fn eviction_is_counted_at_capacity() {
        let cache = EphemeralCache::new(&cache_config(2));
        for _ in 0..3 {
            let user = UserKey::from_uuid(Uuid::new_v4());
            cache.put_meta(user, meta_row(user, 0));
        }
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn disabled_cache_is_noop() {
        let cache = EphemeralCache::new(&CacheConfig {
            enabled: false,
            ..cache_config(16)
        });
        let user = UserKey::generate();
        cache.put_meta(user, meta_row(user, 1));
        assert!(cache.get_meta(user).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn expired_session_entries_are_not_served() {
        let cache = EphemeralCache::new(&cache_config(16));
        let user = UserKey::generate();
        cache.put_session(session_row(user, "diff_3_c"), Duration::ZERO);
        assert!(cache.get_session("diff_3_c").is_none());
    }
}
