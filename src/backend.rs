use fieldx::fxstruct;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::config::SchemesConfig;
use crate::error::StoreError;
use crate::key::KeyBuilder;
use crate::key::Prekey;
use crate::key::MAX_KEY_LENGTH;
use crate::traits::Observer;
use crate::traits::Store;
use crate::types::StoreOp;

pub const LOCK_SCOPE: &str = "lock";

/// The handle every scheme is built with: the store, the key settings and whoever wants to hear about store failures.
///
/// This is also where the failure policy lives. Each method here swallows store errors, reports them, and hands back a
/// plain outcome; whether that outcome means "fail open" or "fail closed" is decided by the method the scheme picks.
///
/// ```ignore
/// let backend = Backend::builder()
///     .store(Arc::new(MemoryStore::builder().build()?))
///     .key_prefix("app")
///     .build()?;
/// ```
#[fxstruct(sync, rc, no_new, default(off), builder)]
pub struct Backend {
    #[fieldx(get(clone), builder(required))]
    store: Arc<dyn Store>,

    /// Application-wide prefix put in front of every key.
    #[fieldx(optional, get(as_ref), builder(into))]
    key_prefix: String,

    #[fieldx(get(copy), default(MAX_KEY_LENGTH))]
    max_key_length: usize,

    #[fieldx(optional, get(as_ref))]
    observer: Arc<dyn Observer>,

    #[fieldx(lazy, get(clone), builder(off))]
    keys: KeyBuilder,

    #[fieldx(lazy, get(clone), builder(off))]
    lock_keys: KeyBuilder,
}

impl BackendBuilder {
    /// Take the key settings from configuration.
    pub fn config(self, config: &SchemesConfig) -> Self {
        let builder = self.max_key_length(config.max_key_length);
        match config.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => builder.key_prefix(prefix),
            _ => builder,
        }
    }
}

impl Backend {
    /// A backend over `store` with the key settings of `config`.
    pub fn from_config(
        store: Arc<dyn Store>,
        config: &SchemesConfig,
    ) -> Result<Arc<Self>, impl std::error::Error + Send + Sync + 'static> {
        Self::builder().store(store).config(config).build()
    }

    fn build_keys(&self) -> KeyBuilder {
        KeyBuilder::new(self.key_prefix().map(String::as_str), self.max_key_length()).reserving(LOCK_SCOPE)
    }

    fn build_lock_keys(&self) -> KeyBuilder {
        self.keys().scoped(LOCK_SCOPE)
    }

    pub fn key_for(&self, namespace: &str, prekey: &Prekey, suffix: Option<&str>) -> String {
        self.keys().build(namespace, prekey.parts(), suffix)
    }

    pub fn lock_key_for(&self, namespace: &str, prekey: &Prekey, suffix: Option<&str>) -> String {
        self.lock_keys().build(namespace, prekey.parts(), suffix)
    }

    async fn report(&self, op: StoreOp, key: &str, err: &StoreError) {
        warn!("[{}] {op}({key}) failed: {err}", self.store().name());
        if let Some(observer) = self.observer() {
            observer.on_store_error(op, key, err).await;
        }
    }

    pub(crate) async fn report_payload(&self, key: &str, message: &str) {
        warn!("[{}] bad payload under '{key}': {message}", self.store().name());
        if let Some(observer) = self.observer() {
            observer.on_payload_error(key, message).await;
        }
    }

    async fn checked<T>(&self, op: StoreOp, key: &str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(ref err) = result {
            self.report(op, key, err).await;
        }
        result
    }

    /// Read a key; the error is reported before it is returned.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self.store().get(key).await;
        self.checked(StoreOp::Get, key, result).await
    }

    /// Read a key, treating any failure as absence.
    pub(crate) async fn fetch_or_miss(&self, key: &str) -> Option<Vec<u8>> {
        self.fetch(key).await.ok().flatten()
    }

    #[instrument(level = "trace", skip(self, value))]
    pub(crate) async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        if ttl.is_zero() {
            debug!("[{}] SET({key}) skipped: zero TTL", self.store().name());
            return false;
        }
        let result = self.store().set(key, value, ttl).await;
        self.checked(StoreOp::Set, key, result).await.unwrap_or(false)
    }

    /// Insert unless a live value exists. A failure is indistinguishable from losing the race.
    #[instrument(level = "trace", skip(self, value))]
    pub(crate) async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        if ttl.is_zero() {
            debug!("[{}] SET-IF-ABSENT({key}) skipped: zero TTL", self.store().name());
            return false;
        }
        let result = self.store().set_if_absent(key, value, ttl).await;
        self.checked(StoreOp::SetIfAbsent, key, result).await.unwrap_or(false)
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn remove(&self, key: &str) -> bool {
        let result = self.store().delete(key).await;
        self.checked(StoreOp::Delete, key, result).await.is_ok()
    }

    #[instrument(level = "trace", skip(self, expected))]
    pub(crate) async fn remove_if_eq(&self, key: &str, expected: &[u8]) -> bool {
        let result = self.store().delete_if_eq(key, expected).await;
        self.checked(StoreOp::DeleteIfEq, key, result).await.unwrap_or(false)
    }
}

impl Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("store", &self.store().name())
            .field("key_prefix", &self.key_prefix())
            .field("max_key_length", &self.max_key_length())
            .finish()
    }
}
