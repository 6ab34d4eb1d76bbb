//! Engine Adapter Module
//!
//! Opens the LMDB environment backing the cache and hands out its two
//! companion tables: `cache` (key -> value) and `expiry` (key -> record).

use std::fs;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::info;

use crate::config::CacheConfig;
use crate::error::Result;

/// Name of the value table
pub const VALUES_TABLE: &str = "cache";

/// Name of the expiry metadata table
pub const EXPIRY_TABLE: &str = "expiry";

/// Map sizes are rounded up to this so they are a multiple of any OS page size.
const MAP_SIZE_ALIGNMENT: usize = 64 * 1024;

pub(crate) type Table = Database<Bytes, Bytes>;

// == Engine ==
/// An open environment plus handles to both tables.
pub(crate) struct Engine {
    env: Env,
    pub(crate) values: Table,
    pub(crate) expiry: Table,
}

impl Engine {
    // == Open ==
    /// Opens (creating if needed) the environment under `config.data_path`.
    pub(crate) fn open(config: &CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_path)?;

        let map_size = config.max_size.div_ceil(MAP_SIZE_ALIGNMENT) * MAP_SIZE_ALIGNMENT;

        // SAFETY: the environment is opened once per store and the files are
        // not truncated or remapped elsewhere while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_readers(config.max_readers)
                .max_dbs(2)
                .open(&config.data_path)?
        };

        let mut wtxn = env.write_txn()?;
        let values: Table = env.create_database(&mut wtxn, Some(VALUES_TABLE))?;
        let expiry: Table = env.create_database(&mut wtxn, Some(EXPIRY_TABLE))?;
        wtxn.commit()?;

        info!(
            path = %config.data_path.display(),
            map_size,
            max_readers = config.max_readers,
            "Cache environment opened"
        );

        Ok(Self { env, values, expiry })
    }

    pub(crate) fn read_txn(&self) -> Result<RoTxn<'_>> {
        Ok(self.env.read_txn()?)
    }

    pub(crate) fn write_txn(&self) -> Result<RwTxn<'_>> {
        Ok(self.env.write_txn()?)
    }
}
