use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::instrument;

use crate::backend::Backend;
use crate::key::Prekey;
use crate::retry::retry_until;
use crate::retry::RetryPolicy;
use crate::traits::LockScheme;
use crate::types::HolderToken;
use crate::types::LockOutcome;

/// A distributed lock over one resource: a [`LockScheme`] bound to a prekey.
///
/// The entry stores the holder's token and expires after the scheme's lease, so a crashed holder can't keep the
/// resource forever. Lock keys live in their own `lock` scope and never collide with cache keys of the same namespace.
///
/// Any store failure makes the lock look taken.
#[derive(Debug)]
pub struct Lock<S>
where
    S: LockScheme,
{
    backend: Arc<Backend>,
    scheme:  S,
    key:     String,
}

impl<S> Lock<S>
where
    S: LockScheme,
{
    pub fn new(backend: &Arc<Backend>, scheme: S, prekey: Prekey) -> Self {
        let key = backend.lock_key_for(&scheme.namespace(), &prekey, scheme.key_suffix().as_deref());
        Self {
            backend: backend.clone(),
            scheme,
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease(&self) -> Duration {
        self.scheme.lease()
    }

    /// Take the lock for `holder`. Returns `false` if it is held by anyone, including `holder` itself.
    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn acquire(&self, holder: &HolderToken) -> bool {
        let acquired = self
            .backend
            .add(&self.key, holder.as_bytes().to_vec(), self.scheme.lease())
            .await;
        debug!("[{}] {holder} acquired: {acquired}", self.key);
        acquired
    }

    /// Free the lock, but only if `holder` is the one holding it.
    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn release(&self, holder: &HolderToken) -> bool {
        let released = self.backend.remove_if_eq(&self.key, holder.as_bytes()).await;
        debug!("[{}] {holder} released: {released}", self.key);
        released
    }

    /// Free the lock no matter who holds it.
    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn force_release(&self) -> bool {
        self.backend.remove(&self.key).await
    }

    #[instrument(level = "trace", skip(self), fields(key = %self.key))]
    pub async fn is_locked(&self) -> bool {
        self.backend.fetch(&self.key).await.map_or(true, |v| v.is_some())
    }

    pub async fn holder(&self) -> Option<HolderToken> {
        self.backend
            .fetch_or_miss(&self.key)
            .await
            .and_then(|bytes| HolderToken::from_bytes(&bytes))
    }

    /// Run `work` while holding the lock. The lock is released afterwards whatever `work` returned; if it can't be
    /// taken `work` is not run at all.
    pub async fn with_lock<F, T>(&self, holder: &HolderToken, work: F) -> LockOutcome<T>
    where
        F: Future<Output = T>,
    {
        if !self.acquire(holder).await {
            return LockOutcome::Contended;
        }
        let result = work.await;
        self.release(holder).await;
        LockOutcome::Acquired(result)
    }

    /// Keep trying to take the lock as the policy allows.
    pub async fn acquire_with_retry(&self, holder: &HolderToken, policy: &RetryPolicy) -> bool {
        retry_until(policy, || self.acquire(holder), |acquired| *acquired)
            .await
            .is_ready()
    }
}
