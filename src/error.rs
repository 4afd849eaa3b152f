use thiserror::Error;

/// Raised when a prekey component can't be turned into a stable key part. This is a programming error on the caller's
/// side and is reported when the part is built, never silently turned into a colliding key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("non-finite float {0} can't be used as a key component")]
    NonFiniteFloat(f64),

    #[error("{0} can't be used as a key component")]
    Unsupported(&'static str),
}

/// Errors reported by a [`Store`](crate::traits::Store) implementation.
///
/// They never reach the users of the schemes: the [`Backend`](crate::backend::Backend) converts them into the
/// fail-open or fail-closed outcome of the operation and reports them to the log and the observer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store is unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("raw id must be 1 or greater")]
    ZeroId,

    #[error("minimum code length {min_length} is out of range for base {base}")]
    MinLength { min_length: u32, base: u32 },

    #[error("raw id {0} is too large to encode")]
    Overflow(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
