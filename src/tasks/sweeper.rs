//! Expiration Sweeper
//!
//! Opportunistic maintenance that reclaims expired entries. There is no timer:
//! every store operation asks the sweeper whether a sweep is due, and at most
//! one caller per scan period wins the right to launch it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::cache::engine::Engine;
use crate::cache::{duration_to_ticks, now_ticks, ExpiryRecord, StatsCounters};
use crate::error::Result;

// == Expiration Sweeper ==
/// Decides when a sweep is due. Owned by a single store instance.
#[derive(Debug)]
pub struct ExpirationSweeper {
    /// Tick count at which the last sweep was claimed
    last_swept: AtomicI64,
    /// Minimum ticks that must elapse between two sweeps
    frequency_ticks: i64,
}

impl ExpirationSweeper {
    pub fn new(frequency: Duration, now: i64) -> Self {
        Self {
            last_swept: AtomicI64::new(now),
            frequency_ticks: duration_to_ticks(frequency),
        }
    }

    // == Try Claim ==
    /// Returns true if more than the scan frequency has elapsed since the last
    /// sweep and this caller won the race to start the next one.
    ///
    /// The timestamp is moved forward before the sweep is launched, so among
    /// concurrent callers observing the same elapsed period only the one whose
    /// compare-and-swap succeeds gets `true`.
    pub fn try_claim(&self, now: i64) -> bool {
        let last = self.last_swept.load(Ordering::Acquire);
        if now.saturating_sub(last) <= self.frequency_ticks {
            return false;
        }

        self.last_swept
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn last_swept_ticks(&self) -> i64 {
        self.last_swept.load(Ordering::Acquire)
    }
}

// == Sweep ==
/// Deletes every expired value/expiry pair inside one write transaction.
///
/// Walks the value table in key order. Values without an expiry row are left
/// alone. Returns the number of pairs removed.
pub(crate) fn sweep_expired(engine: &Engine, now: i64) -> Result<usize> {
    let mut wtxn = engine.write_txn()?;
    let mut expired = Vec::new();

    for entry in engine.values.iter(&wtxn)? {
        let (key, _) = entry?;
        let Some(raw) = engine.expiry.get(&wtxn, key)? else {
            continue;
        };

        match ExpiryRecord::from_bytes(raw) {
            Ok(record) if record.is_expired(now) => expired.push(key.to_vec()),
            Ok(_) => {}
            Err(err) => warn!(
                key = %String::from_utf8_lossy(key),
                error = %err,
                "Skipping unreadable expiry row"
            ),
        }
    }

    for key in &expired {
        trace!(key = %String::from_utf8_lossy(key), "Cleaning up expired entry");
        engine.values.delete(&mut wtxn, key)?;
        engine.expiry.delete(&mut wtxn, key)?;
    }

    wtxn.commit()?;
    Ok(expired.len())
}

/// Launches a sweep without blocking the caller.
///
/// Runs on tokio's blocking pool when called from inside a runtime, otherwise
/// on a dedicated thread. Failures are logged and dropped.
pub(crate) fn spawn_sweep(engine: Arc<Engine>, counters: Arc<StatsCounters>) {
    let job = move || run_sweep(&engine, &counters);

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(job);
        }
        Err(_) => {
            if let Err(err) = thread::Builder::new()
                .name("lightning-cache-sweep".to_string())
                .spawn(job)
            {
                error!(error = %err, "Failed to launch expiration sweep");
            }
        }
    }
}

fn run_sweep(engine: &Engine, counters: &StatsCounters) {
    let started = Instant::now();
    report_sweep(sweep_expired(engine, now_ticks()), started, counters);
}

/// Records a finished sweep. Errors only reach the log.
fn report_sweep(outcome: Result<usize>, started: Instant, counters: &StatsCounters) {
    match outcome {
        Ok(removed) => {
            counters.record_sweep(removed);
            if removed > 0 {
                info!(
                    removed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Expiration sweep removed expired entries"
                );
            } else {
                debug!("Expiration sweep found no expired entries");
            }
        }
        Err(err) => {
            error!(error = %err, "Expiration sweep failed");
        }
    }
}
