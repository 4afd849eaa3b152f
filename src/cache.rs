use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::instrument;

use crate::backend::Backend;
use crate::key::Prekey;
use crate::traits::CacheScheme;
use crate::types::StorePolicy;

/// One cached resource: a [`CacheScheme`] bound to a prekey.
///
/// The key is derived once, at construction. All operations report store failures to the backend and carry on: reads
/// turn into misses, writes into `false`.
///
/// ```ignore
/// let cache = TtlCache::new(&backend, UserFollowingCache, prekey![user_id]);
/// let ids = cache
///     .get_or_insert_with(|| async { load_following(user_id).await })
///     .await;
/// ```
#[derive(Debug)]
pub struct TtlCache<S>
where
    S: CacheScheme,
{
    backend: Arc<Backend>,
    scheme:  S,
    prekey:  Prekey,
    key:     String,
}

impl<S> TtlCache<S>
where
    S: CacheScheme,
{
    pub fn new(backend: &Arc<Backend>, scheme: S, prekey: Prekey) -> Self {
        let key = backend.key_for(&scheme.namespace(), &prekey, scheme.key_suffix().as_deref());
        Self {
            backend: backend.clone(),
            scheme,
            prekey,
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn prekey(&self) -> &Prekey {
        &self.prekey
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn ttl(&self) -> Duration {
        self.scheme.duration()
    }

    /// The cached value. Absence, a failed read and a payload that no longer decodes all read as a miss.
    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn get(&self) -> Option<S::Value> {
        let bytes = self.backend.fetch_or_miss(&self.key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                self.backend.report_payload(&self.key, &err.to_string()).await;
                None
            }
        }
    }

    /// Store `value` for `duration`, or for the scheme's own duration if `None`.
    ///
    /// With `refresh` the value always replaces whatever is there. Otherwise the scheme's
    /// [`store_policy`](CacheScheme::store_policy) decides. Returns `true` if the value was written.
    #[instrument(level = "trace", skip(self, value), fields(key = %self.key))]
    pub async fn cache_store(&self, value: &S::Value, duration: Option<Duration>, refresh: bool) -> bool {
        let ttl = duration.unwrap_or_else(|| self.scheme.duration());
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(err) => {
                self.backend.report_payload(&self.key, &err.to_string()).await;
                return false;
            }
        };

        let add_only = !refresh && self.scheme.store_policy() == StorePolicy::AddOnly;
        let written = if add_only {
            self.backend.add(&self.key, payload, ttl).await
        }
        else {
            self.backend.put(&self.key, payload, ttl).await
        };
        debug!("[{}] stored: {written}, add only: {add_only}, ttl: {ttl:?}", self.key);
        written
    }

    pub async fn store(&self, value: &S::Value) -> bool {
        self.cache_store(value, None, false).await
    }

    /// Drop the cached value. Succeeds when there was nothing to drop.
    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn invalidate(&self) -> bool {
        self.backend.remove(&self.key).await
    }

    /// Return the cached value or compute, store and return a fresh one. A failure to store doesn't prevent the
    /// computed value from being returned.
    pub async fn get_or_insert_with<F, Fut>(&self, f: F) -> S::Value
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = S::Value>,
    {
        if let Some(value) = self.get().await {
            return value;
        }
        let value = f().await;
        self.store(&value).await;
        value
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for a fallible computation. Errors are neither cached nor
    /// swallowed.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, f: F) -> Result<S::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S::Value, E>>,
    {
        if let Some(value) = self.get().await {
            return Ok(value);
        }
        let value = f().await?;
        self.store(&value).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use crate::prekey;
    use crate::traits::Store;
    use crate::types::TIMEOUT_1_HOUR;
    use serde::Deserialize;
    use serde::Serialize;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct UserFollowingCache;

    impl CacheScheme for UserFollowingCache {
        type Value = Vec<u64>;

        fn duration(&self) -> Duration {
            TIMEOUT_1_HOUR
        }
    }

    #[derive(Debug)]
    struct FirstWins;

    impl CacheScheme for FirstWins {
        type Value = String;

        fn duration(&self) -> Duration {
            Duration::from_secs(60)
        }

        fn namespace(&self) -> Cow<'static, str> {
            Cow::Borrowed("first")
        }

        fn key_suffix(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("v2"))
        }

        fn store_policy(&self) -> StorePolicy {
            StorePolicy::AddOnly
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Profile {
        name: String,
    }

    #[derive(Debug)]
    struct ProfileCache;

    impl CacheScheme for ProfileCache {
        type Value = Profile;

        fn duration(&self) -> Duration {
            Duration::from_secs(60)
        }
    }

    fn setup() -> (Arc<Backend>, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::builder().clock(clock.clone()).build().expect("memory store"));
        let backend = Backend::builder().store(store.clone()).build().expect("backend");
        (backend, store, clock)
    }

    #[test]
    fn key_comes_from_scheme() {
        let (backend, _, _) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![42]);
        assert_eq!(cache.key(), "UserFollowingCache:i42");
        let cache = TtlCache::new(&backend, FirstWins, prekey!["x"]);
        assert_eq!(cache.key(), "first:s78:v2");
        assert_eq!(cache.ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn store_and_expire() {
        let (backend, _, clock) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![42]);
        assert_eq!(cache.get().await, None);
        assert!(cache.store(&vec![1, 2, 3]).await);
        assert_eq!(cache.get().await, Some(vec![1, 2, 3]));
        // Idempotent.
        assert!(cache.store(&vec![1, 2, 3]).await);
        assert_eq!(cache.get().await, Some(vec![1, 2, 3]));

        clock.advance(TIMEOUT_1_HOUR - Duration::from_secs(1));
        assert!(cache.get().await.is_some());
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn explicit_duration_overrides_scheme() {
        let (backend, _, clock) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![1]);
        assert!(cache.cache_store(&vec![7], Some(Duration::from_secs(5)), false).await);
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get().await, None);
        assert!(!cache.cache_store(&vec![7], Some(Duration::ZERO), true).await);
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn add_only_keeps_first_value() {
        let (backend, _, _) = setup();
        let cache = TtlCache::new(&backend, FirstWins, prekey![1]);
        assert!(cache.store(&"first".to_string()).await);
        assert!(!cache.store(&"second".to_string()).await);
        assert_eq!(cache.get().await.as_deref(), Some("first"));
        assert!(cache.cache_store(&"third".to_string(), None, true).await);
        assert_eq!(cache.get().await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let (backend, _, _) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![1]);
        cache.store(&vec![1]).await;
        assert!(cache.invalidate().await);
        assert!(cache.invalidate().await);
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn garbage_payload_is_a_miss() {
        let (backend, store, _) = setup();
        let cache = TtlCache::new(&backend, ProfileCache, prekey![1]);
        store.set(cache.key(), b"not json".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get().await, None);

        let profile = Profile { name: "ann".into() };
        assert!(cache.store(&profile).await);
        assert_eq!(cache.get().await, Some(profile));
    }

    #[tokio::test]
    async fn outage_fails_open() {
        let (backend, store, _) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![1]);
        cache.store(&vec![1]).await;
        store.set_offline(true);
        assert_eq!(cache.get().await, None);
        assert!(!cache.store(&vec![2]).await);
        assert!(!cache.invalidate().await);
        let value = cache.get_or_insert_with(|| async { vec![3] }).await;
        assert_eq!(value, vec![3]);
    }

    #[tokio::test]
    async fn compute_on_miss_only() {
        let (backend, _, _) = setup();
        let cache = TtlCache::new(&backend, UserFollowingCache, prekey![9]);
        let value = cache.get_or_insert_with(|| async { vec![9] }).await;
        assert_eq!(value, vec![9]);
        let value = cache.get_or_insert_with(|| async { vec![0] }).await;
        assert_eq!(value, vec![9]);

        let other = TtlCache::new(&backend, UserFollowingCache, prekey![10]);
        let err = other
            .get_or_try_insert_with(|| async { Err::<Vec<u64>, _>("db is down") })
            .await;
        assert_eq!(err, Err("db is down"));
        assert_eq!(other.get().await, None);
    }
}
