use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::codec::DEFAULT_MIN_LENGTH;
use crate::error::ConfigError;
use crate::key::MAX_KEY_LENGTH;
use crate::stock::CacheSpec;
use crate::stock::CooldownSpec;
use crate::stock::LockSpec;

/// Settings shared by every scheme of an application. Passed in explicitly, never looked up globally.
///
/// ```json
/// {
///     "key_prefix": "app",
///     "codec": { "min_length": 6, "alphabet": "base62" },
///     "durations": { "UserFollowingCache": 3600 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemesConfig {
    pub key_prefix:     Option<String>,
    pub max_key_length: usize,
    pub codec:          CodecConfig,
    /// Seconds, by scheme name.
    pub durations:      BTreeMap<String, u64>,
}

impl Default for SchemesConfig {
    fn default() -> Self {
        Self {
            key_prefix:     None,
            max_key_length: MAX_KEY_LENGTH,
            codec:          CodecConfig::default(),
            durations:      BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub min_length: u32,
    pub alphabet:   AlphabetKind,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            alphabet:   AlphabetKind::Base62,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphabetKind {
    #[default]
    Base62,
    Base52,
    /// Any set of distinct printable ASCII symbols, zero first.
    Custom(String),
}

impl SchemesConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// The configured duration for the scheme `name`.
    pub fn duration(&self, name: &str) -> Option<Duration> {
        self.durations.get(name).copied().map(Duration::from_secs)
    }

    pub fn duration_or(&self, name: &str, default: Duration) -> Duration {
        self.duration(name).unwrap_or(default)
    }

    /// A cache scheme named `name`, its duration taken from the config if set there.
    pub fn cache_spec<V>(&self, name: &str, default: Duration) -> CacheSpec<V>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        CacheSpec::new(name, self.duration_or(name, default))
    }

    pub fn lock_spec(&self, name: &str, default: Duration) -> LockSpec {
        LockSpec::new(name, self.duration_or(name, default))
    }

    pub fn cooldown_spec(&self, name: &str, default: Duration) -> CooldownSpec {
        CooldownSpec::new(name, self.duration_or(name, default))
    }
}
