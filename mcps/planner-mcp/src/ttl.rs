//! Expiring key/value registry shared by the client cache and the session
//! manager
//!
//! An entry is valid while both hold:
//! - `now - last_accessed_at < idle_timeout`
//! - `now - created_at < max_lifetime`
//!
//! A successful lookup of a valid entry slides `last_accessed_at` forward.
//! Looking at an expired entry never revives it. Every removal path other
//! than [`TtlRegistry::remove`] releases the value (logout, transport close)
//! and tolerates release failures: the entry leaves the map regardless.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on a single release call during eviction
const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle timeout plus hard lifetime cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl TtlPolicy {
    pub fn new(idle_timeout: Duration, max_lifetime: Duration) -> Self {
        Self {
            idle_timeout,
            max_lifetime,
        }
    }

    pub fn is_valid(&self, stamps: &Timestamps, now: Instant) -> bool {
        now.saturating_duration_since(stamps.last_accessed_at) < self.idle_timeout
            && now.saturating_duration_since(stamps.created_at) < self.max_lifetime
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Instant,
    pub last_accessed_at: Instant,
}

impl Timestamps {
    fn fresh(now: Instant) -> Self {
        Self {
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// Resource held by a registry entry that must be let go on eviction
#[async_trait]
pub trait Release: Send + Sync {
    async fn release(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: Release + ?Sized> Release for Arc<T> {
    async fn release(&self) -> anyhow::Result<()> {
        (**self).release().await
    }
}

/// Outcome of a synchronous lookup
#[derive(Debug)]
pub enum Access<V> {
    /// Entry was valid; its last-access time has been updated
    Hit(V),
    /// Entry had expired and was removed; the caller owns its release
    Expired(V),
    Missing,
}

struct Slot<V> {
    value: V,
    stamps: Timestamps,
}

/// Map whose entries expire under a [`TtlPolicy`]
pub struct TtlRegistry<K, V> {
    kind: &'static str,
    policy: TtlPolicy,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlRegistry<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    V: Release + Clone,
{
    /// `kind` names the registry in log events ("client", "session")
    pub fn new(kind: &'static str, policy: TtlPolicy) -> Self {
        Self {
            kind,
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Insert with fresh timestamps, returning any value that was replaced
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let slot = Slot {
            value,
            stamps: Timestamps::fresh(Instant::now()),
        };
        self.slots.lock().insert(key, slot).map(|old| old.value)
    }

    /// Validate-then-touch lookup. Expired entries are removed and handed
    /// back unreleased.
    pub fn access(&self, key: &K) -> Access<V> {
        let now = Instant::now();
        let mut slots = self.slots.lock();

        let Some(slot) = slots.get_mut(key) else {
            return Access::Missing;
        };
        if self.policy.is_valid(&slot.stamps, now) {
            slot.stamps.last_accessed_at = now;
            return Access::Hit(slot.value.clone());
        }

        match slots.remove(key) {
            Some(slot) => Access::Expired(slot.value),
            None => Access::Missing,
        }
    }

    /// Like [`access`](Self::access), releasing an expired entry before
    /// reporting it as absent
    pub async fn get(&self, key: &K) -> Option<V> {
        match self.access(key) {
            Access::Hit(value) => Some(value),
            Access::Expired(value) => {
                debug!(kind = self.kind, ?key, "evicting expired entry on lookup");
                release_logged(self.kind, key, value).await;
                None
            }
            Access::Missing => None,
        }
    }

    /// Validity check without touching the entry
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        self.slots
            .lock()
            .get(key)
            .is_some_and(|slot| self.policy.is_valid(&slot.stamps, now))
    }

    /// Slide the idle window of a valid entry. Expired entries are left for
    /// the next lookup or sweep.
    pub fn touch(&self, key: &K) -> bool {
        let now = Instant::now();
        match self.slots.lock().get_mut(key) {
            Some(slot) if self.policy.is_valid(&slot.stamps, now) => {
                slot.stamps.last_accessed_at = now;
                true
            }
            _ => false,
        }
    }

    /// Remove and release one entry
    pub async fn evict(&self, key: &K) -> bool {
        let Some(value) = self.remove(key) else {
            return false;
        };
        release_logged(self.kind, key, value).await;
        true
    }

    pub fn timestamps(&self, key: &K) -> Option<Timestamps> {
        self.slots.lock().get(key).map(|slot| slot.stamps)
    }

    /// Remove without releasing
    pub fn remove(&self, key: &K) -> Option<V> {
        self.slots.lock().remove(key).map(|slot| slot.value)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Remove and release every expired entry, returning how many went
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.slots.lock().retain(|key, slot| {
            let keep = self.policy.is_valid(&slot.stamps, now);
            if !keep {
                expired.push((key.clone(), slot.value.clone()));
            }
            keep
        });

        let count = expired.len();
        if count > 0 {
            release_all(self.kind, expired).await;
        }
        count
    }

    /// Remove and release everything
    pub async fn drain_all(&self) -> usize {
        let drained: Vec<(K, V)> = self
            .slots
            .lock()
            .drain()
            .map(|(key, slot)| (key, slot.value))
            .collect();

        let count = drained.len();
        release_all(self.kind, drained).await;
        count
    }
}

async fn release_all<K, V>(kind: &'static str, entries: Vec<(K, V)>)
where
    K: fmt::Debug,
    V: Release,
{
    join_all(
        entries
            .into_iter()
            .map(|(key, value)| async move { release_logged(kind, &key, value).await }),
    )
    .await;
}

async fn release_logged<K, V>(kind: &'static str, key: &K, value: V)
where
    K: fmt::Debug,
    V: Release,
{
    match tokio::time::timeout(RELEASE_TIMEOUT, value.release()).await {
        Ok(Ok(())) => debug!(kind, ?key, "released"),
        Ok(Err(e)) => warn!(kind, ?key, error = %e, "release failed; entry dropped anyway"),
        Err(_) => warn!(kind, ?key, "release timed out; entry dropped anyway"),
    }
}
