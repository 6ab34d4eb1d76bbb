//! Lightning Cache - A durable TTL cache on top of LMDB
//!
//! Stores values and their expiration metadata in two companion tables of an
//! embedded LMDB environment, with absolute and sliding expiration and
//! opportunistic background reclamation of expired entries.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, CacheStore, ExpirationOptions, ExpiryRecord};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
