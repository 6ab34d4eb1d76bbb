//! Background Tasks Module
//!
//! Maintenance work that runs off the caller's thread.
//!
//! # Tasks
//! - Expiration sweep: reclaims expired entries, launched opportunistically
//!   after store operations

pub(crate) mod sweeper;

pub use sweeper::ExpirationSweeper;
