use async_trait::async_trait;
use fieldx::fxstruct;
use moka::future::Cache;
use moka::ops::compute::CompResult;
use moka::ops::compute::Op;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::fmt::Debug;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tracing::instrument;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::error::StoreError;
use crate::traits::Store;
use crate::types::MAX_TTL;

#[derive(Debug, Clone)]
struct StoredValue {
    bytes:      Arc<[u8]>,
    expires_at: Instant,
    ttl:        Duration,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct TtlExpiry;

impl Expiry<String, StoredValue> for TtlExpiry {
    fn expire_after_create(&self, _key: &String, value: &StoredValue, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`Store`] on top of a moka cache.
///
/// Entries are evicted by moka when their TTL runs out in real time, but liveness is always decided against the
/// configured [`Clock`], so a [`ManualClock`](crate::clock::ManualClock) can expire them early. Conditional operations
/// go through moka's entry compute API and are atomic within the process.
#[fxstruct(sync, no_new, builder)]
pub struct MemoryStore {
    #[fieldx(get(copy), default(10_000))]
    max_capacity: u64,

    #[fieldx(get(copy), default("memory"))]
    name: &'static str,

    #[fieldx(get(clone), default(Arc::new(SystemClock) as Arc<dyn Clock>))]
    clock: Arc<dyn Clock>,

    #[fieldx(private, lazy, get(clone), builder(off))]
    entries: Cache<String, StoredValue>,

    // When raised every operation fails as if the store went away.
    #[fieldx(private, builder(off), default(AtomicBool::new(false)))]
    offline: AtomicBool,
}

impl MemoryStore {
    fn build_entries(&self) -> Cache<String, StoredValue> {
        Cache::builder()
            .max_capacity(self.max_capacity())
            .name(self.name())
            .eviction_policy(EvictionPolicy::tiny_lfu())
            .expire_after(TtlExpiry)
            .build()
    }

    /// Simulate an outage: while offline every operation returns [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_offline() {
            Err(StoreError::Unavailable(format!("{} store is offline", self.name())))
        }
        else {
            Ok(())
        }
    }

    fn stored(&self, value: Vec<u8>, ttl: Duration) -> Result<StoredValue, StoreError> {
        let ttl = ttl.min(MAX_TTL);
        let expires_at = self
            .clock()
            .now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Backend(format!("TTL of {ttl:?} is out of the clock's range")))?;
        Ok(StoredValue {
            bytes: Arc::from(value),
            expires_at,
            ttl,
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        MemoryStore::name(self)
    }

    #[instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_online()?;
        let now = self.clock().now();
        Ok(self
            .entries()
            .get(key)
            .await
            .filter(|v| v.is_live(now))
            .map(|v| v.bytes.to_vec()))
    }

    #[instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
        self.ensure_online()?;
        self.entries().insert(key.to_string(), self.stored(value, ttl)?).await;
        Ok(true)
    }

    #[instrument(level = "trace", skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let now = self.clock().now();
        let stored = self.stored(value, ttl)?;
        let result = self
            .entries()
            .entry(key.to_string())
            .and_compute_with(|entry| async move {
                match entry {
                    Some(e) if e.value().is_live(now) => Op::Nop,
                    _ => Op::Put(stored),
                }
            })
            .await;
        Ok(matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_)))
    }

    #[instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.entries().invalidate(key).await;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, expected))]
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let now = self.clock().now();
        let result = self
            .entries()
            .entry(key.to_string())
            .and_compute_with(|entry| async move {
                match entry {
                    Some(e) if e.value().is_live(now) && *e.value().bytes == *expected => Op::Remove,
                    _ => Op::Nop,
                }
            })
            .await;
        Ok(matches!(result, CompResult::Removed(_)))
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name())
            .field("max_capacity", &self.max_capacity())
            .field("clock", &self.clock())
            .field("offline", &self.is_offline())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::builder().clock(clock.clone()).build().expect("memory store");
        (store, clock)
    }

    #[tokio::test]
    async fn expiry_follows_the_clock() {
        let (store, clock) = store_with_clock();
        let ttl = Duration::from_secs(30);
        assert!(store.set("k", b"v".to_vec(), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(Duration::from_secs(29));
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_respects_live_entries() {
        let (store, clock) = store_with_clock();
        let ttl = Duration::from_secs(10);
        assert!(store.set_if_absent("k", b"first".to_vec(), ttl).await.unwrap());
        assert!(!store.set_if_absent("k", b"second".to_vec(), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"first".to_vec()));

        // An expired entry counts as absent even if moka hasn't evicted it yet.
        clock.advance(ttl);
        assert!(store.set_if_absent("k", b"third".to_vec(), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"third".to_vec()));
    }

    #[tokio::test]
    async fn delete_if_eq_checks_the_value() {
        let (store, _clock) = store_with_clock();
        let ttl = Duration::from_secs(10);
        store.set("k", b"mine".to_vec(), ttl).await.unwrap();
        assert!(!store.delete_if_eq("k", b"yours").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"mine".to_vec()));
        assert!(store.delete_if_eq("k", b"mine").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete_if_eq("k", b"mine").await.unwrap());
    }

    #[tokio::test]
    async fn delete_absent_is_fine() {
        let (store, _clock) = store_with_clock();
        store.delete("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn offline_store_fails_everything() {
        let (store, _clock) = store_with_clock();
        store.set_offline(true);
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store.set("k", vec![1], Duration::from_secs(1)).await.is_err());
        assert!(store.set_if_absent("k", vec![1], Duration::from_secs(1)).await.is_err());
        assert!(store.delete("k").await.is_err());
        assert!(store.delete_if_eq("k", &[1]).await.is_err());
        store.set_offline(false);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn huge_ttls_are_capped() {
        let (store, clock) = store_with_clock();
        assert!(store.set("k", b"v".to_vec(), Duration::MAX).await.unwrap());
        assert!(store.set_if_absent("n", b"v".to_vec(), Duration::MAX).await.unwrap());
        assert_eq!(store.entries().get("k").await.map(|v| v.ttl), Some(MAX_TTL));

        clock.advance(MAX_TTL - Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("n").await.unwrap(), Some(b"v".to_vec()));
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn set_if_absent_has_one_winner() {
        let store = Arc::new(MemoryStore::builder().build().expect("memory store"));
        let mut handles = Vec::new();
        for i in 0..32u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_if_absent("race", vec![i], Duration::from_secs(60)).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
