//! Cache Store Module
//!
//! Public get/set/remove/refresh surface over the engine. Every operation runs
//! in a single transaction that touches the value row and the expiry row
//! together, then gives the sweeper a chance to start maintenance.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, trace};

use crate::cache::engine::Engine;
use crate::cache::expiry::{now_ticks, ExpirationOptions, ExpiryRecord};
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::cache::MAX_KEY_LENGTH;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::sweeper::{self, ExpirationSweeper};

/// Lifecycle of the shared engine handle.
enum EngineSlot {
    Unopened,
    Open(Arc<Engine>),
    Closed,
}

struct Inner {
    config: CacheConfig,
    engine: RwLock<EngineSlot>,
    sweeper: ExpirationSweeper,
    counters: Arc<StatsCounters>,
}

// == Cache Store ==
/// Durable TTL cache backed by an LMDB environment.
///
/// Cloning is cheap and every clone shares the same environment, sweeper
/// state and statistics. The environment is opened on first use.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store for `config`, failing fast on invalid settings.
    ///
    /// No files are touched until the first operation.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let sweeper = ExpirationSweeper::new(config.expiration_scan_frequency, now_ticks());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                engine: RwLock::new(EngineSlot::Unopened),
                sweeper,
                counters: Arc::new(StatsCounters::default()),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // == Get ==
    /// Returns the live value stored under `key`.
    ///
    /// A hit moves the entry's last-access time to now, restarting any
    /// sliding window. Expired entries read as `None` and are left for the
    /// sweeper to delete.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = validate_key(key)?;
        let engine = self.engine()?;

        let value = read_and_touch(&engine, key, now_ticks())?;
        match value {
            Some(_) => self.inner.counters.record_hit(),
            None => self.inner.counters.record_miss(),
        }

        self.maybe_sweep(&engine);
        Ok(value)
    }

    /// Like [`get`](Self::get), decoding the value as UTF-8.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|err| {
                    CacheError::InvalidArgument(format!("Value is not UTF-8: {}", err))
                })
            })
            .transpose()
    }

    // == Refresh ==
    /// Bumps the access time of a live entry without returning it.
    pub fn refresh(&self, key: &str) -> Result<()> {
        self.get(key).map(|_| ())
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any existing entry.
    pub fn set(&self, key: &str, value: &[u8], options: &ExpirationOptions) -> Result<()> {
        let key = validate_key(key)?;
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidArgument(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        let engine = self.engine()?;

        let record = ExpiryRecord::from_options(options, now_ticks());

        let mut wtxn = engine.write_txn()?;
        engine.expiry.put(&mut wtxn, key, &record.to_bytes())?;
        engine.values.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        trace!(key = %String::from_utf8_lossy(key), size = value.len(), "Entry stored");

        self.maybe_sweep(&engine);
        Ok(())
    }

    pub fn set_string(&self, key: &str, value: &str, options: &ExpirationOptions) -> Result<()> {
        self.set(key, value.as_bytes(), options)
    }

    // == Remove ==
    /// Deletes the entry under `key`. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        let engine = self.engine()?;

        let mut wtxn = engine.write_txn()?;
        engine.expiry.delete(&mut wtxn, key)?;
        let existed = engine.values.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        trace!(key = %String::from_utf8_lossy(key), existed, "Entry removed");

        self.maybe_sweep(&engine);
        Ok(())
    }

    // == Async Variants ==
    // Same transaction on tokio's blocking pool; completion order matches the blocking form.

    pub async fn get_async(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_owned();
        run_blocking(move || store.get(&key)).await
    }

    pub async fn refresh_async(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_owned();
        run_blocking(move || store.refresh(&key)).await
    }

    pub async fn set_async(
        &self,
        key: &str,
        value: Vec<u8>,
        options: ExpirationOptions,
    ) -> Result<()> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_owned();
        run_blocking(move || store.set(&key, &value, &options)).await
    }

    pub async fn remove_async(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_owned();
        run_blocking(move || store.remove(&key)).await
    }

    // == Maintenance ==
    /// Runs an expiration sweep on the calling thread.
    ///
    /// Returns the number of entries reclaimed.
    pub fn purge_expired(&self) -> Result<usize> {
        let engine = self.engine()?;
        let removed = sweeper::sweep_expired(&engine, now_ticks())?;
        self.inner.counters.record_sweep(removed);
        debug!(removed, "Manual expiration sweep finished");
        Ok(removed)
    }

    /// Reads the stored expiry metadata for `key` without touching it.
    pub fn peek_expiry(&self, key: &str) -> Result<Option<ExpiryRecord>> {
        let key = validate_key(key)?;
        let engine = self.engine()?;

        let rtxn = engine.read_txn()?;
        let raw = engine.expiry.get(&rtxn, key)?;
        raw.map(ExpiryRecord::from_bytes).transpose()
    }

    // == Stats ==
    /// Returns counters plus the current row count of both tables.
    pub fn stats(&self) -> Result<CacheStats> {
        let engine = self.engine()?;
        let rtxn = engine.read_txn()?;

        let mut stats = self.inner.counters.snapshot();
        stats.value_rows = engine.values.len(&rtxn)?;
        stats.expiry_rows = engine.expiry.len(&rtxn)?;
        Ok(stats)
    }

    // == Close ==
    /// Releases the engine. Further calls on any clone fail with
    /// [`CacheError::Disposed`]. Closing more than once is a no-op.
    pub fn close(&self) {
        let mut slot = self.inner.engine.write().unwrap_or_else(PoisonError::into_inner);
        if let EngineSlot::Open(engine) = std::mem::replace(&mut *slot, EngineSlot::Closed) {
            drop(engine);
            info!(path = %self.inner.config.data_path.display(), "Cache environment closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            *self.inner.engine.read().unwrap_or_else(PoisonError::into_inner),
            EngineSlot::Closed
        )
    }

    /// Returns the open engine, opening it on first use.
    fn engine(&self) -> Result<Arc<Engine>> {
        {
            let slot = self.inner.engine.read().unwrap_or_else(PoisonError::into_inner);
            match &*slot {
                EngineSlot::Open(engine) => return Ok(Arc::clone(engine)),
                EngineSlot::Closed => return Err(CacheError::Disposed),
                EngineSlot::Unopened => {}
            }
        }

        // Another caller may have opened or closed it in between
        let mut slot = self.inner.engine.write().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            EngineSlot::Open(engine) => return Ok(Arc::clone(engine)),
            EngineSlot::Closed => return Err(CacheError::Disposed),
            EngineSlot::Unopened => {}
        }

        let engine = Arc::new(Engine::open(&self.inner.config)?);
        *slot = EngineSlot::Open(Arc::clone(&engine));
        Ok(engine)
    }

    fn maybe_sweep(&self, engine: &Arc<Engine>) {
        if self.inner.sweeper.try_claim(now_ticks()) {
            debug!("Launching expiration sweep");
            sweeper::spawn_sweep(Arc::clone(engine), Arc::clone(&self.inner.counters));
        }
    }
}

/// Rejects empty keys and returns the key's byte form.
fn validate_key(key: &str) -> Result<&[u8]> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("Key cannot be empty".to_string()));
    }
    Ok(key.as_bytes())
}

/// Reads a live value and records the access, all in one write transaction.
///
/// Misses abort the transaction so nothing is written. Reads take the writer
/// lock even on a miss because a hit must bump the access time in the same
/// transaction it read from, so a get can wait behind a running sweep.
fn read_and_touch(engine: &Engine, key: &[u8], now: i64) -> Result<Option<Vec<u8>>> {
    let mut wtxn = engine.write_txn()?;

    let value = match engine.values.get(&wtxn, key)? {
        Some(value) => value.to_vec(),
        None => return Ok(None),
    };
    let record = match engine.expiry.get(&wtxn, key)? {
        Some(raw) => ExpiryRecord::from_bytes(raw)?,
        None => return Ok(None),
    };

    if record.is_expired(now) {
        trace!(key = %String::from_utf8_lossy(key), "Entry expired; reporting miss");
        return Ok(None);
    }

    engine.expiry.put(&mut wtxn, key, &record.touched(now).to_bytes())?;
    wtxn.commit()?;
    Ok(Some(value))
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| CacheError::Internal(err.to_string()))?
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_store(dir: &TempDir) -> CacheStore {
        CacheStore::new(
            CacheConfig::default()
                .with_data_path(dir.path())
                .with_scan_frequency(Duration::from_secs(3600)),
        )
        .unwrap()
    }

    #[test]
    fn test_store_is_lazy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lazy");
        let store =
            CacheStore::new(CacheConfig::default().with_data_path(&path)).unwrap();

        assert!(!path.exists());
        store.get("missing").unwrap();
        assert!(path.join("data.mdb").exists());
    }

    #[test]
    fn test_store_set_and_get() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set("key1", b"value1", &ExpirationOptions::new()).unwrap();

        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));
    }

    #[test]
    fn test_store_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_store_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set_string("key1", "value1", &ExpirationOptions::new()).unwrap();
        store.set_string("key1", "value2", &ExpirationOptions::new()).unwrap();

        assert_eq!(store.get_string("key1").unwrap().as_deref(), Some("value2"));
        assert_eq!(store.stats().unwrap().value_rows, 1);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let options = ExpirationOptions::new().with_relative_to_now(Duration::from_millis(50));

        store.set("key1", b"value1", &options).unwrap();
        assert!(store.get("key1").unwrap().is_some());

        sleep(Duration::from_millis(100));

        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_expired_read_does_not_delete() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let options = ExpirationOptions::new().with_relative_to_now(Duration::from_nanos(100));

        store.set("stale", b"v", &options).unwrap();
        sleep(Duration::from_millis(5));

        assert_eq!(store.get("stale").unwrap(), None);
        let stats = store.stats().unwrap();
        assert_eq!(stats.value_rows, 1);
        assert_eq!(stats.expiry_rows, 1);
    }

    #[test]
    fn test_hit_touches_access_time() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set("key1", b"value1", &ExpirationOptions::new()).unwrap();
        let before = store.peek_expiry("key1").unwrap().unwrap();
        sleep(Duration::from_millis(5));
        store.refresh("key1").unwrap();
        let after = store.peek_expiry("key1").unwrap().unwrap();

        assert!(after.last_accessed_ticks > before.last_accessed_ticks);
        assert_eq!(after.absolute_deadline_ticks, before.absolute_deadline_ticks);
    }

    #[test]
    fn test_store_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set("key1", b"value1", &ExpirationOptions::new()).unwrap();
        store.remove("key1").unwrap();
        store.remove("key1").unwrap();

        assert_eq!(store.get("key1").unwrap(), None);
        assert_eq!(store.peek_expiry("key1").unwrap(), None);
    }

    #[test]
    fn test_empty_key_rejected() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        assert!(matches!(store.get(""), Err(CacheError::InvalidArgument(_))));
        assert!(matches!(store.refresh(""), Err(CacheError::InvalidArgument(_))));
        assert!(matches!(store.remove(""), Err(CacheError::InvalidArgument(_))));
        assert!(matches!(
            store.set("", b"v", &ExpirationOptions::new()),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_store_key_length_limit() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let options = ExpirationOptions::new();

        let max_key = "x".repeat(MAX_KEY_LENGTH);
        store.set(&max_key, b"value", &options).unwrap();
        assert_eq!(store.get(&max_key).unwrap(), Some(b"value".to_vec()));

        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            store.set(&long_key, b"value", &options),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_close_disposes_every_clone() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let other = store.clone();

        store.set("key1", b"value1", &ExpirationOptions::new()).unwrap();
        store.close();
        store.close();

        assert!(other.is_closed());
        assert!(matches!(other.get("key1"), Err(CacheError::Disposed)));
        assert!(matches!(store.remove("key1"), Err(CacheError::Disposed)));
        assert!(matches!(store.stats(), Err(CacheError::Disposed)));
    }

    #[test]
    fn test_close_before_first_use() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.close();

        assert!(matches!(
            store.set("key1", b"v", &ExpirationOptions::new()),
            Err(CacheError::Disposed)
        ));
    }

    #[test]
    fn test_store_stats_counts_hits_and_misses() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set("key1", b"value1", &ExpirationOptions::new()).unwrap();
        store.get("key1").unwrap();
        store.get("nonexistent").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.value_rows, 1);
        assert_eq!(stats.expiry_rows, 1);
    }

    #[test]
    fn test_purge_expired_reclaims_both_rows() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        let short = ExpirationOptions::new().with_relative_to_now(Duration::from_millis(1));

        store.set("short", b"1", &short).unwrap();
        store.set("forever", b"2", &ExpirationOptions::new()).unwrap();
        sleep(Duration::from_millis(10));

        assert_eq!(store.purge_expired().unwrap(), 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.value_rows, 1);
        assert_eq!(stats.expiry_rows, 1);
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.reclaimed, 1);
    }

    #[test]
    fn test_non_utf8_value_as_string() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        store.set("bin", &[0xff, 0xfe], &ExpirationOptions::new()).unwrap();

        assert!(store.get_string("bin").is_err());
        assert_eq!(store.get("bin").unwrap(), Some(vec![0xff, 0xfe]));
    }
}
