//! Per-user sync lock table.
//!
//! Write-path operations (batch add, reset) serialize per user through this
//! table. Read-path operations never take a lock; `check` only peeks.
//! Release happens through a RAII guard so every exit path, including
//! errors and cancellation at an await point, drops the lock.

use crate::error::SyncError;
use dashmap::DashMap;
use frkb_core::UserKey;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A lock held past this age is presumed leaked and may be reclaimed by the
/// next write-path request.
pub const FORCE_RECLAIM_AFTER: Duration = Duration::minutes(5);

/// Write-path operation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    BatchAdd,
    Reset,
    /// The meta refresh run by check's count-equal/hash-differ tie-break.
    MetaRefresh,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchAdd => "batch_add",
            Self::Reset => "reset",
            Self::MetaRefresh => "meta_refresh",
        }
    }
}

/// State of one held lock.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub operation: SyncOperation,
    pub lock_id: Uuid,
    pub acquired_at: OffsetDateTime,
}

impl LockInfo {
    /// Wall-clock age of the lock.
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        now - self.acquired_at
    }
}

/// In-process table of per-user sync locks.
#[derive(Clone)]
pub struct SyncLockTable {
    locks: Arc<DashMap<UserKey, LockInfo>>,
}

impl SyncLockTable {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Acquire the write lock for a user.
    ///
    /// A conflicting live lock fails with `SyncInProgress`. A lock older
    /// than [`FORCE_RECLAIM_AFTER`] is forcibly reclaimed; the stale
    /// holder's guard becomes a no-op.
    pub fn acquire(&self, user: UserKey, operation: SyncOperation) -> Result<SyncLockGuard, SyncError> {
        self.acquire_at(user, operation, OffsetDateTime::now_utc())
    }

    pub(crate) fn acquire_at(
        &self,
        user: UserKey,
        operation: SyncOperation,
        now: OffsetDateTime,
    ) -> Result<SyncLockGuard, SyncError> {
        let info = LockInfo {
            operation,
            lock_id: Uuid::new_v4(),
            acquired_at: now,
        };
        let lock_id = info.lock_id;

        match self.locks.entry(user) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(info);
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let held = occupied.get();
                let held_for = held.age(now);
                if held_for < FORCE_RECLAIM_AFTER {
                    return Err(SyncError::SyncInProgress {
                        operation: held.operation.as_str(),
                        held_for_secs: held_for.whole_seconds().max(0) as u64,
                    });
                }
                tracing::warn!(
                    user_key = %user,
                    stale_operation = held.operation.as_str(),
                    held_for_secs = held_for.whole_seconds(),
                    "Forcibly reclaiming stale sync lock"
                );
                occupied.insert(info);
            }
        }

        Ok(SyncLockGuard {
            locks: self.locks.clone(),
            user,
            lock_id,
        })
    }

    /// Current lock for a user, if any. Lock-free on the read path.
    pub fn peek(&self, user: UserKey) -> Option<LockInfo> {
        self.locks.get(&user).map(|entry| entry.clone())
    }

    /// Administrative force-release. Returns whether a lock was held.
    pub fn force_release(&self, user: UserKey) -> bool {
        self.locks.remove(&user).is_some()
    }

    /// Remove locks older than `max_age`, logging each. Returns the number
    /// released.
    pub fn sweep(&self, max_age: Duration, now: OffsetDateTime) -> usize {
        let mut released = 0;
        self.locks.retain(|user, info| {
            let keep = info.age(now) < max_age;
            if !keep {
                released += 1;
                tracing::warn!(
                    user_key = %user,
                    operation = info.operation.as_str(),
                    age_secs = info.age(now).whole_seconds(),
                    "Releasing stale sync lock during maintenance sweep"
                );
            }
            keep
        });
        released
    }

    /// Number of currently held locks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for SyncLockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a held sync lock.
///
/// Dropping releases the lock only if this guard still owns it; a lock that
/// was forcibly reclaimed by a newer request stays with its new owner.
#[derive(Debug)]
pub struct SyncLockGuard {
    locks: Arc<DashMap<UserKey, LockInfo>>,
    user: UserKey,
    lock_id: Uuid,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.locks
            .remove_if(&self.user, |_, info| info.lock_id == self.lock_id);
    }
}
