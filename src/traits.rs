use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::StoreError;
use crate::key::type_namespace;
use crate::types::StorePolicy;
use crate::types::StoreOp;

/// The shared key-value store all schemes ride on.
///
/// Every method must be safe to call concurrently from independent processes. `ttl` is an expiry after which the key
/// effectively ceases to exist.
#[async_trait]
pub trait Store: Debug + Send + Sync + 'static {
    /// Store name, for logging.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace the value, resetting its TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError>;

    /// Atomically insert the value unless the key holds a live one. Returns `true` if the value was inserted.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove the key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove the key only if it currently holds `expected`. Returns `true` if the key was removed.
    ///
    /// The default implementation is a plain read followed by a delete and can race with a concurrent writer. Stores
    /// able to do it atomically should override it.
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        if self.get(key).await?.as_deref() == Some(expected) {
            self.delete(key).await?;
            Ok(true)
        }
        else {
            Ok(false)
        }
    }
}

/// Receives the errors the schemes swallow. Hook alerting in here.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    async fn on_store_error(&self, _op: StoreOp, _key: &str, _error: &StoreError) {}
    /// A stored payload could not be encoded or decoded.
    async fn on_payload_error(&self, _key: &str, _message: &str) {}
}

/// A cacheable resource type.
///
/// ```ignore
/// struct UserFollowingCache;
///
/// impl CacheScheme for UserFollowingCache {
///     type Value = Vec<u64>;
///
///     fn duration(&self) -> Duration {
///         TIMEOUT_1_HOUR
///     }
/// }
/// ```
pub trait CacheScheme: Send + Sync + 'static {
    type Value: Serialize + DeserializeOwned + Send + Sync;

    /// How stale a cached value may get.
    fn duration(&self) -> Duration;

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(type_namespace::<Self>())
    }

    fn key_suffix(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn store_policy(&self) -> StorePolicy {
        StorePolicy::Overwrite
    }
}

/// A lockable resource type.
pub trait LockScheme: Send + Sync + 'static {
    /// For how long a lock is held if its holder never releases it.
    fn lease(&self) -> Duration;

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(type_namespace::<Self>())
    }

    fn key_suffix(&self) -> Option<Cow<'_, str>> {
        None
    }
}

/// A repeatable unit of work that must not run for the same entity more than once per window.
pub trait CooldownScheme: Send + Sync + 'static {
    fn cooldown(&self) -> Duration;

    fn namespace(&self) -> Cow<'static, str> {
        Cow::Owned(type_namespace::<Self>())
    }
}
