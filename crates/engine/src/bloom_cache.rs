//! Per-user bloom filter cache.
//!
//! Probabilistic accelerator for "is this fingerprint definitely absent?".
//! Filters build lazily from the fingerprint store and persist into the
//! user-meta blob so restarts skip the rebuild. A filter answer is advisory:
//! only "definitely absent" may be trusted, and callers re-verify any
//! "possibly present" against authoritative storage.

use crate::error::SyncResult;
use dashmap::DashMap;
use frkb_core::config::BloomConfig;
use frkb_core::{FingerprintBloomFilter, UserKey};
use frkb_metadata::MetadataStore;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

/// Where a membership answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomSource {
    /// A live filter answered.
    Filter,
    /// The user has no fingerprints; absence is certain without a filter.
    NoData,
    /// Filtering is disabled; everything is "possibly present".
    BloomDisabled,
}

/// Single membership answer.
#[derive(Debug, Clone, Copy)]
pub struct BloomAnswer {
    pub possible: bool,
    pub source: BloomSource,
}

/// Batched membership summary, returned alongside diff responses.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomBatchSummary {
    pub checked: usize,
    pub possibly_present: usize,
    pub definitely_absent: usize,
    pub source: BloomSource,
}

/// Filter statistics for status endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomStats {
    pub item_count: usize,
    pub bit_count: usize,
    pub hash_count: u8,
    pub estimated_false_positive_rate: f64,
    pub memory_bytes: usize,
}

/// In-memory map of per-user filters over the fingerprint store.
pub struct BloomFilterCache {
    config: BloomConfig,
    store: Arc<dyn MetadataStore>,
    filters: DashMap<UserKey, Arc<RwLock<FingerprintBloomFilter>>>,
}

impl BloomFilterCache {
    pub fn new(config: BloomConfig, store: Arc<dyn MetadataStore>) -> Self {
        Self {
            config,
            store,
            filters: DashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn capacity_for(&self, current_count: u64) -> usize {
        let scaled = (current_count as f64 * self.config.capacity_multiplier).ceil() as usize;
        scaled.max(self.config.min_capacity)
    }

    /// Fetch the user's filter, building it if necessary.
    ///
    /// Returns `None` when the user has no fingerprints (no filter needed;
    /// absence is certain). The first call for a populated user blocks on a
    /// full enumeration unless a persisted blob restores cleanly.
    async fn get_or_build(
        &self,
        user: UserKey,
        rebuild: bool,
    ) -> SyncResult<Option<Arc<RwLock<FingerprintBloomFilter>>>> {
        if !rebuild {
            if let Some(existing) = self.filters.get(&user) {
                return Ok(Some(existing.clone()));
            }
        }

        let count = self.store.count_fingerprints(user.as_uuid()).await?;
        if count == 0 {
            self.filters.remove(&user);
            return Ok(None);
        }

        // A persisted blob skips the enumeration; a bad blob falls back to
        // a rebuild rather than ever answering from broken state.
        if !rebuild {
            if let Some(blob) = self.store.load_bloom_blob(user.as_uuid()).await? {
                match FingerprintBloomFilter::from_blob(&blob) {
                    Ok(filter) => {
                        let shared = Arc::new(RwLock::new(filter));
                        self.filters.insert(user, shared.clone());
                        return Ok(Some(shared));
                    }
                    Err(e) => {
                        tracing::warn!(
                            user_key = %user,
                            error = %e,
                            "Persisted bloom filter unusable, rebuilding"
                        );
                    }
                }
            }
        }

        let fingerprints = self.store.list_fingerprints(user.as_uuid()).await?;
        let mut filter = FingerprintBloomFilter::with_capacity(
            self.capacity_for(count),
            self.config.false_positive_rate,
        );
        for fp in &fingerprints {
            filter.insert(fp);
        }

        let blob = filter.to_blob();
        let shared = Arc::new(RwLock::new(filter));
        self.filters.insert(user, shared.clone());

        // Persisting the blob is an optimization; losing it only costs a
        // rebuild after restart.
        if let Err(e) = self
            .store
            .store_bloom_blob(user.as_uuid(), &blob, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(user_key = %user, error = %e, "Failed to persist bloom filter blob");
        }

        tracing::debug!(
            user_key = %user,
            items = fingerprints.len(),
            "Built bloom filter"
        );
        Ok(Some(shared))
    }

    /// Probe a single fingerprint.
    pub async fn might_contain(
        &self,
        user: UserKey,
        fingerprint: &str,
        rebuild: bool,
    ) -> SyncResult<BloomAnswer> {
        if !self.config.enabled {
            return Ok(BloomAnswer {
                possible: true,
                source: BloomSource::BloomDisabled,
            });
        }
        match self.get_or_build(user, rebuild).await? {
            None => Ok(BloomAnswer {
                possible: false,
                source: BloomSource::NoData,
            }),
            Some(filter) => {
                let possible = filter
                    .read()
                    .expect("bloom filter lock poisoned")
                    .might_contain(fingerprint);
                Ok(BloomAnswer {
                    possible,
                    source: BloomSource::Filter,
                })
            }
        }
    }

    /// Probe a batch; returns per-element answers plus a summary.
    pub async fn batch_might_contain(
        &self,
        user: UserKey,
        fingerprints: &[String],
    ) -> SyncResult<(Vec<bool>, BloomBatchSummary)> {
        if !self.config.enabled {
            let answers = vec![true; fingerprints.len()];
            return Ok((
                answers,
                BloomBatchSummary {
                    checked: fingerprints.len(),
                    possibly_present: fingerprints.len(),
                    definitely_absent: 0,
                    source: BloomSource::BloomDisabled,
                },
            ));
        }

        match self.get_or_build(user, false).await? {
            None => Ok((
                vec![false; fingerprints.len()],
                BloomBatchSummary {
                    checked: fingerprints.len(),
                    possibly_present: 0,
                    definitely_absent: fingerprints.len(),
                    source: BloomSource::NoData,
                },
            )),
            Some(filter) => {
                let guard = filter.read().expect("bloom filter lock poisoned");
                let answers: Vec<bool> = fingerprints
                    .iter()
                    .map(|fp| guard.might_contain(fp))
                    .collect();
                drop(guard);

                let possibly_present = answers.iter().filter(|possible| **possible).count();
                Ok((
                    answers,
                    BloomBatchSummary {
                        checked: fingerprints.len(),
                        possibly_present,
                        definitely_absent: fingerprints.len() - possibly_present,
                        source: BloomSource::Filter,
                    },
                ))
            }
        }
    }

    /// Best-effort incremental insertion after a batch add. Only touches a
    /// filter that is already in memory; absent filters pick the new
    /// fingerprints up on their next build.
    pub fn add_fingerprints(&self, user: UserKey, fingerprints: &[String]) {
        if !self.config.enabled {
            return;
        }
        if let Some(filter) = self.filters.get(&user) {
            let mut guard = filter.write().expect("bloom filter lock poisoned");
            for fp in fingerprints {
                guard.insert(fp);
            }
        }
    }

    /// Drop the in-memory filter for a user.
    pub fn clear(&self, user: UserKey) {
        self.filters.remove(&user);
    }

    /// Stats for the in-memory filter, if one exists.
    pub fn stats(&self, user: UserKey) -> Option<BloomStats> {
        self.filters.get(&user).map(|filter| {
            let guard = filter.read().expect("bloom filter lock poisoned");
            BloomStats {
                item_count: guard.item_count(),
                bit_count: guard.bit_count(),
                hash_count: guard.hash_count(),
                estimated_false_positive_rate: guard.estimated_fp_rate(),
                memory_bytes: guard.memory_bytes(),
            }
        })
    }

    /// Number of filters currently in memory.
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Combined heap footprint of all in-memory filters.
    pub fn total_memory_bytes(&self) -> usize {
        self.filters
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .read()
                    .expect("bloom filter lock poisoned")
                    .memory_bytes()
            })
            .sum()
    }
}
