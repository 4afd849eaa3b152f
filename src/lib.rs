//! # ttl-schemes
//!
//! Declarative, TTL-bound coordination over a shared key-value store: caches, distributed locks and cooldowns, plus a
//! reversible codec turning sequential ids into short public codes.
//!
//! # The Basics
//!
//! Every resource type is described once by a *scheme*: a type implementing [`CacheScheme`](traits::CacheScheme),
//! [`LockScheme`](traits::LockScheme) or [`CooldownScheme`](traits::CooldownScheme). The scheme fixes the namespace of
//! its keys and how long its entries live, so callers never pick durations themselves. A scheme combined with a
//! *prekey* (the ordered values identifying one resource, e.g. a user id) gives a store key:
//!
//! ```ignore
//! cache_scheme! {
//!     pub UserFollowingCache: Vec<u64> = TIMEOUT_1_HOUR
//! }
//!
//! let cache = TtlCache::new(&backend, UserFollowingCache, prekey![user_id]);
//! let following = cache.get_or_insert_with(|| load_following(user_id)).await;
//! ```
//!
//! Coordination happens only through the store. The crate ships two [`Store`](traits::Store) implementations:
//!
//! - [`MemoryStore`](memory::MemoryStore), an in-process store over the [moka](https://crates.io/crates/moka) cache;
//! - `RedisStore` (feature `redis`), for coordination across processes.
//!
//! # Failure Policy
//!
//! Store failures never reach the caller. The [`Backend`](backend::Backend) logs them, forwards them to an optional
//! [`Observer`](traits::Observer), and turns them into an outcome:
//!
//! | operation | on store failure |
//! | --------- | ---------------- |
//! | cache read, cooldown check | miss, i.e. recompute / not on cooldown |
//! | lock acquire | not acquired |
//! | lock peek | locked |
//! | any write or delete | `false` |
//!
//! Caching stays an optimization while locks stay safe.
//!
//! # Public Codes
//!
//! [`ReversibleIdCodec`](codec::ReversibleIdCodec) maps raw ids `1..` to codes of at least a minimum length and back,
//! rejecting most forged codes without touching any storage.

pub mod backend;
pub mod batch;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod key;
pub mod lock;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod retry;
pub mod stock;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use backend::Backend;
#[doc(inline)]
pub use cache::TtlCache;
#[doc(inline)]
pub use codec::ReversibleIdCodec;
#[doc(inline)]
pub use cooldown::Cooldown;
#[doc(inline)]
pub use lock::Lock;

pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::batch::CooldownBatch;
    pub use crate::batch::CooldownTiming;
    pub use crate::cache::TtlCache;
    pub use crate::clock::Clock;
    pub use crate::codec::Alphabet;
    pub use crate::codec::ReversibleIdCodec;
    pub use crate::config::SchemesConfig;
    pub use crate::cooldown::Cooldown;
    pub use crate::key::KeyPart;
    pub use crate::key::Prekey;
    pub use crate::lock::Lock;
    pub use crate::memory::MemoryStore;
    pub use crate::retry::RetryPolicy;
    pub use crate::traits::*;
    pub use crate::types::*;
}

/// Build a [`Prekey`](key::Prekey) from anything convertible into a [`KeyPart`](key::KeyPart).
///
/// ```
/// use ttl_schemes::prekey;
///
/// let prekey = prekey![42, "a@b.c", Some(true)];
/// assert_eq!(prekey.parts().len(), 3);
/// assert_eq!(prekey![], ttl_schemes::key::Prekey::default());
/// ```
#[macro_export]
macro_rules! prekey {
    () => {
        $crate::key::Prekey::default()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::key::Prekey::from_parts(vec![$($crate::key::KeyPart::from($part)),+])
    };
}

/// Declare a unit-struct [`CacheScheme`](traits::CacheScheme) namespaced by its own name.
///
/// ```
/// use ttl_schemes::cache_scheme;
/// use ttl_schemes::types::StorePolicy;
/// use ttl_schemes::types::TIMEOUT_1_HOUR;
///
/// cache_scheme! {
///     /// Ids of the users someone follows.
///     pub UserFollowingCache: Vec<u64> = TIMEOUT_1_HOUR
/// }
///
/// cache_scheme! {
///     FirstSeenCache: String = TIMEOUT_1_HOUR; policy = StorePolicy::AddOnly
/// }
/// ```
#[macro_export]
macro_rules! cache_scheme {
    ($(#[$meta:meta])* $vis:vis $name:ident : $value:ty = $duration:expr $(; policy = $policy:expr)?) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::traits::CacheScheme for $name {
            type Value = $value;

            fn duration(&self) -> ::std::time::Duration {
                $duration
            }

            fn namespace(&self) -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(stringify!($name))
            }

            $(
                fn store_policy(&self) -> $crate::types::StorePolicy {
                    $policy
                }
            )?
        }
    };
}

/// Declare a unit-struct [`LockScheme`](traits::LockScheme) with the given lease.
#[macro_export]
macro_rules! lock_scheme {
    ($(#[$meta:meta])* $vis:vis $name:ident = $lease:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::traits::LockScheme for $name {
            fn lease(&self) -> ::std::time::Duration {
                $lease
            }

            fn namespace(&self) -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(stringify!($name))
            }
        }
    };
}

/// Declare a unit-struct [`CooldownScheme`](traits::CooldownScheme) with the given window.
#[macro_export]
macro_rules! cooldown_scheme {
    ($(#[$meta:meta])* $vis:vis $name:ident = $cooldown:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::traits::CooldownScheme for $name {
            fn cooldown(&self) -> ::std::time::Duration {
                $cooldown
            }

            fn namespace(&self) -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(stringify!($name))
            }
        }
    };
}
