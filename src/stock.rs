//! Ready-made schemes, and schemes assembled at run time from configuration.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::time::Duration;

use crate::key::Prekey;
use crate::traits::CacheScheme;
use crate::traits::CooldownScheme;
use crate::traits::LockScheme;
use crate::types::StorePolicy;
use crate::types::TIMEOUT_1_MINUTE;
use crate::types::TIMEOUT_24_HOURS;
use crate::types::TIMEOUT_30_DAYS;

crate::cache_scheme! {
    /// Cache-busting version tag of the deployed static assets.
    pub StaticAssetVersionCache: String = TIMEOUT_30_DAYS
}

crate::cooldown_scheme! {
    /// Generic per-task throttle; the prekey names the task and its entity.
    pub TaskCooldown = TIMEOUT_24_HOURS
}

crate::cooldown_scheme! {
    /// At most one relationship digest email per user and day.
    pub BatchRelationshipEmailCooldown = TIMEOUT_24_HOURS
}

crate::lock_scheme! {
    /// Serializes concurrent registrations of the same email address.
    pub EmailRegistrationLock = TIMEOUT_1_MINUTE
}

impl EmailRegistrationLock {
    /// Addresses differing only in case or surrounding whitespace share one lock.
    pub fn prekey(email: &str) -> Prekey {
        crate::prekey![email.trim().to_lowercase()]
    }
}

/// A cache scheme defined at run time.
#[derive(Debug, Clone)]
pub struct CacheSpec<V> {
    namespace: String,
    duration:  Duration,
    suffix:    Option<String>,
    policy:    StorePolicy,
    _value:    PhantomData<fn() -> V>,
}

impl<V> CacheSpec<V> {
    pub fn new(namespace: impl Into<String>, duration: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            duration,
            suffix: None,
            policy: StorePolicy::Overwrite,
            _value: PhantomData,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_policy(mut self, policy: StorePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<V> CacheScheme for CacheSpec<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = V;

    fn duration(&self) -> Duration {
        self.duration
    }

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(self.namespace.clone())
    }

    fn key_suffix(&self) -> Option<Cow<'_, str>> {
        self.suffix.as_deref().map(Cow::Borrowed)
    }

    fn store_policy(&self) -> StorePolicy {
        self.policy
    }
}

/// A lock scheme defined at run time.
#[derive(Debug, Clone)]
pub struct LockSpec {
    namespace: String,
    lease:     Duration,
}

impl LockSpec {
    pub fn new(namespace: impl Into<String>, lease: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            lease,
        }
    }
}

impl LockScheme for LockSpec {
    fn lease(&self) -> Duration {
        self.lease
    }

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(self.namespace.clone())
    }
}

/// A cooldown scheme defined at run time.
#[derive(Debug, Clone)]
pub struct CooldownSpec {
    namespace: String,
    cooldown:  Duration,
}

impl CooldownSpec {
    pub fn new(namespace: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            cooldown,
        }
    }
}

impl CooldownScheme for CooldownSpec {
    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(self.namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::cache::TtlCache;
    use crate::lock::Lock;
    use crate::memory::MemoryStore;
    use crate::prekey;
    use std::sync::Arc;

    #[test]
    fn stock_durations_and_namespaces() {
        assert_eq!(StaticAssetVersionCache.duration(), TIMEOUT_30_DAYS);
        assert_eq!(CacheScheme::namespace(&StaticAssetVersionCache), "StaticAssetVersionCache");
        assert_eq!(TaskCooldown.cooldown(), TIMEOUT_24_HOURS);
        assert_eq!(BatchRelationshipEmailCooldown.cooldown(), TIMEOUT_24_HOURS);
        assert_eq!(
            CooldownScheme::namespace(&BatchRelationshipEmailCooldown),
            "BatchRelationshipEmailCooldown"
        );
        assert_eq!(EmailRegistrationLock.lease(), TIMEOUT_1_MINUTE);
    }

    #[tokio::test]
    async fn registration_lock_ignores_case() {
        let store = Arc::new(MemoryStore::builder().build().expect("memory store"));
        let backend = Backend::builder().store(store).build().expect("backend");
        let first = Lock::new(&backend, EmailRegistrationLock, EmailRegistrationLock::prekey(" Ann@Example.com "));
        let second = Lock::new(&backend, EmailRegistrationLock, EmailRegistrationLock::prekey("ann@example.com"));
        assert_eq!(first.key(), second.key());
        assert!(first.acquire(&"a".into()).await);
        assert!(!second.acquire(&"b".into()).await);
    }

    #[tokio::test]
    async fn runtime_cache_spec() {
        let store = Arc::new(MemoryStore::builder().build().expect("memory store"));
        let backend = Backend::builder().store(store).build().expect("backend");
        let spec = CacheSpec::<u32>::new("Counter", Duration::from_secs(10))
            .with_suffix("v1")
            .with_policy(StorePolicy::AddOnly);
        let cache = TtlCache::new(&backend, spec, prekey![1]);
        assert_eq!(cache.key(), "Counter:i1:v1");
        assert!(cache.store(&5).await);
        assert!(!cache.store(&6).await);
        assert_eq!(cache.get().await, Some(5));
    }
}
