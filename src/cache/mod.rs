//! Cache Module
//!
//! Durable caching over LMDB with absolute and sliding expiration.

pub(crate) mod engine;
mod expiry;
mod stats;
mod store;


// Re-export public types
pub use engine::{EXPIRY_TABLE, VALUES_TABLE};
pub use expiry::{
    datetime_to_ticks, duration_to_ticks, now_ticks, ExpirationOptions, ExpiryRecord,
    EXPIRY_RECORD_LEN, NOT_SET,
};
pub use stats::CacheStats;
pub use store::CacheStore;

pub(crate) use stats::StatsCounters;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 511;
