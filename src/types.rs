use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;

pub const TIMEOUT_1_MINUTE: Duration = Duration::from_secs(60);
pub const TIMEOUT_5_MINUTES: Duration = Duration::from_secs(5 * 60);
pub const TIMEOUT_30_MINUTES: Duration = Duration::from_secs(30 * 60);
pub const TIMEOUT_1_HOUR: Duration = Duration::from_secs(60 * 60);
pub const TIMEOUT_24_HOURS: Duration = Duration::from_secs(24 * 60 * 60);
pub const TIMEOUT_48_HOURS: Duration = Duration::from_secs(48 * 60 * 60);
pub const TIMEOUT_30_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Longest TTL a store is asked for. Longer ones, up to [`Duration::MAX`], are cut down to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// What a non-refreshing [`cache_store`](crate::cache::TtlCache::cache_store) does when the key already holds a live
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePolicy {
    /// Replace the value and reset its TTL.
    #[default]
    Overwrite,
    /// Keep the existing value; only an empty key gets populated.
    AddOnly,
}

/// Store operation tag used for logging and observer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    SetIfAbsent,
    Delete,
    DeleteIfEq,
}

impl Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreOp::Get => write!(f, "GET"),
            StoreOp::Set => write!(f, "SET"),
            StoreOp::SetIfAbsent => write!(f, "SET-IF-ABSENT"),
            StoreOp::Delete => write!(f, "DELETE"),
            StoreOp::DeleteIfEq => write!(f, "DELETE-IF-EQ"),
        }
    }
}

/// Identifies whoever holds a lock. Stored as the lock entry value, so only the holder can release it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderToken(String);

impl HolderToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A process-unique token: the process id followed by 128 random bits.
    pub fn generate() -> Self {
        Self(format!("{}-{:032x}", std::process::id(), rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(|s| Self(s.to_string()))
    }
}

impl Display for HolderToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HolderToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for HolderToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// The sentinel stored by a cooldown: when the cooldown was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownMark {
    pub started_at: DateTime<Utc>,
}

impl CooldownMark {
    pub fn now() -> Self {
        Self { started_at: Utc::now() }
    }
}

/// Outcome of [`Lock::with_lock`](crate::lock::Lock::with_lock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was acquired, the work ran and produced this value.
    Acquired(T),
    /// Somebody else holds the lock, or the store could not be reached. The work did not run.
    Contended,
}

impl<T> LockOutcome<T> {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            LockOutcome::Acquired(v) => Some(v),
            LockOutcome::Contended => None,
        }
    }
}
