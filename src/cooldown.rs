use chrono::DateTime;
use chrono::Utc;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::Backend;
use crate::cache::TtlCache;
use crate::key::Prekey;
use crate::traits::CacheScheme;
use crate::traits::CooldownScheme;
use crate::types::CooldownMark;
use crate::types::StorePolicy;

// A cooldown window is just a cached mark living for the cooldown duration. Non-refreshing stores only claim a free
// window.
#[derive(Debug)]
struct CooldownCache<S>(Arc<S>);

impl<S> CacheScheme for CooldownCache<S>
where
    S: CooldownScheme,
{
    type Value = CooldownMark;

    fn duration(&self) -> Duration {
        self.0.cooldown()
    }

    fn namespace(&self) -> Cow<'static, str> {
        self.0.namespace()
    }

    fn store_policy(&self) -> StorePolicy {
        StorePolicy::AddOnly
    }
}

/// Suppresses a repeatable action per entity for the scheme's cooldown window.
///
/// Reads fail open: if the store can't be reached nothing is considered to be on cooldown. A missed suppression means
/// an occasional duplicate reminder, which beats silencing every reminder while the store is down.
#[derive(Debug)]
pub struct Cooldown<S>
where
    S: CooldownScheme,
{
    backend: Arc<Backend>,
    scheme:  Arc<S>,
}

impl<S> Clone for Cooldown<S>
where
    S: CooldownScheme,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            scheme:  self.scheme.clone(),
        }
    }
}

impl<S> Cooldown<S>
where
    S: CooldownScheme,
{
    pub fn new(backend: &Arc<Backend>, scheme: S) -> Self {
        Self {
            backend: backend.clone(),
            scheme:  Arc::new(scheme),
        }
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn duration(&self) -> Duration {
        self.scheme.cooldown()
    }

    fn entry(&self, entity: &Prekey) -> TtlCache<CooldownCache<S>> {
        TtlCache::new(&self.backend, CooldownCache(self.scheme.clone()), entity.clone())
    }

    pub fn key(&self, entity: &Prekey) -> String {
        self.entry(entity).key().to_string()
    }

    pub async fn has_cooldown(&self, entity: &Prekey) -> bool {
        self.entry(entity).get().await.is_some()
    }

    /// When the running cooldown was started.
    pub async fn started_at(&self, entity: &Prekey) -> Option<DateTime<Utc>> {
        self.entry(entity).get().await.map(|mark| mark.started_at)
    }

    /// Start, or restart, the cooldown window.
    pub async fn start_cooldown(&self, entity: &Prekey) -> bool {
        self.entry(entity).cache_store(&CooldownMark::now(), None, true).await
    }

    /// Start the cooldown unless one is already running. With `force` it is restarted regardless. Returns `true` if a
    /// new window was started; of concurrent non-forced calls only one gets it.
    pub async fn reset_cooldown(&self, entity: &Prekey, force: bool) -> bool {
        let entry = self.entry(entity);
        let started = entry.cache_store(&CooldownMark::now(), None, force).await;
        if !started {
            debug!("[{}] still cooling down", entry.key());
        }
        started
    }

    pub async fn clear_cooldown(&self, entity: &Prekey) -> bool {
        self.entry(entity).invalidate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use crate::prekey;
    use crate::types::TIMEOUT_24_HOURS;

    #[derive(Debug)]
    struct ReminderCooldown;

    impl CooldownScheme for ReminderCooldown {
        fn cooldown(&self) -> Duration {
            TIMEOUT_24_HOURS
        }
    }

    fn setup() -> (Cooldown<ReminderCooldown>, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::builder().clock(clock.clone()).build().expect("memory store"));
        let backend = Backend::builder().store(store.clone()).build().expect("backend");
        (Cooldown::new(&backend, ReminderCooldown), store, clock)
    }

    #[tokio::test]
    async fn cooldown_window() {
        let (cooldown, _, clock) = setup();
        let user = prekey![17];
        assert_eq!(cooldown.key(&user), "ReminderCooldown:i17");
        assert!(!cooldown.has_cooldown(&user).await);

        let before = Utc::now();
        assert!(cooldown.start_cooldown(&user).await);
        assert!(cooldown.has_cooldown(&user).await);
        let started = cooldown.started_at(&user).await.expect("cooldown mark");
        assert!(started >= before);

        // Other entities are unaffected.
        assert!(!cooldown.has_cooldown(&prekey![18]).await);

        clock.advance(TIMEOUT_24_HOURS - Duration::from_secs(1));
        assert!(cooldown.has_cooldown(&user).await);
        clock.advance(Duration::from_secs(1));
        assert!(!cooldown.has_cooldown(&user).await);
    }

    #[tokio::test]
    async fn reset_respects_running_window() {
        let (cooldown, _, _) = setup();
        let user = prekey![17];
        assert!(cooldown.reset_cooldown(&user, false).await);
        assert!(!cooldown.reset_cooldown(&user, false).await);
        assert!(cooldown.reset_cooldown(&user, true).await);
        assert!(cooldown.clear_cooldown(&user).await);
        assert!(!cooldown.has_cooldown(&user).await);
        assert!(cooldown.reset_cooldown(&user, false).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resets_start_one_window() {
        let (cooldown, _, _) = setup();
        for round in 0..50 {
            let user = prekey![round];
            let mut handles = Vec::new();
            for _ in 0..16 {
                let cooldown = cooldown.clone();
                let user = user.clone();
                handles.push(tokio::spawn(async move { cooldown.reset_cooldown(&user, false).await }));
            }
            let mut started = 0;
            for handle in handles {
                if handle.await.expect("reset task") {
                    started += 1;
                }
            }
            assert_eq!(started, 1, "round {round}");
        }
    }

    #[tokio::test]
    async fn outage_fails_open() {
        let (cooldown, store, _) = setup();
        let user = prekey![17];
        cooldown.start_cooldown(&user).await;
        store.set_offline(true);
        assert!(!cooldown.has_cooldown(&user).await);
        assert_eq!(cooldown.started_at(&user).await, None);
        assert!(!cooldown.start_cooldown(&user).await);
        store.set_offline(false);
        assert!(cooldown.has_cooldown(&user).await);
    }
}
