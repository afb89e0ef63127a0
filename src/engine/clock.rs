// src/engine/clock.rs

//! Wall-clock access and correction toward the store's authoritative time.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    config::CLOCK_SMOOTHING_WEIGHT,
    store::{DocumentStore, StoreError},
};

/// A source of epoch-millisecond readings.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Used to drive time in tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Exponentially smoothed estimate of `authoritative - local` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetEstimate {
    pub offset_ms: f64,
    pub samples: u64,
}

impl OffsetEstimate {
    /// Folds a new sample in. The first sample is taken as-is.
    pub fn observe(self, sample_ms: f64, weight: f64) -> Self {
        let offset_ms = if self.samples == 0 {
            sample_ms
        } else {
            self.offset_ms * (1.0 - weight) + sample_ms * weight
        };
        Self {
            offset_ms,
            samples: self.samples + 1,
        }
    }
}

impl Default for OffsetEstimate {
    fn default() -> Self {
        Self {
            offset_ms: 0.0,
            samples: 0,
        }
    }
}

/// Local time corrected by the estimated offset to the store's clock.
///
/// Every `now_ms` read that feeds progression math or join times goes
/// through this type.
pub struct OffsetClock {
    source: Arc<dyn TimeSource>,
    estimate: Mutex<OffsetEstimate>,
    offset_ms: AtomicI64,
    samples: AtomicU64,
}

impl OffsetClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            estimate: Mutex::new(OffsetEstimate::default()),
            offset_ms: AtomicI64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    /// Corrected epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.source.now_ms() + self.offset_ms.load(Ordering::SeqCst)
    }

    /// Uncorrected local reading.
    pub fn local_ms(&self) -> i64 {
        self.source.now_ms()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }

    /// Blends one offset sample into the estimate.
    pub fn observe(&self, sample_ms: i64) -> i64 {
        let mut estimate = self.estimate.lock().unwrap_or_else(|e| e.into_inner());
        *estimate = estimate.observe(sample_ms as f64, CLOCK_SMOOTHING_WEIGHT);
        let rounded = estimate.offset_ms.round() as i64;
        self.offset_ms.store(rounded, Ordering::SeqCst);
        self.samples.store(estimate.samples, Ordering::SeqCst);
        rounded
    }

    /// Takes one round-trip sample against the store and folds it in.
    ///
    /// The server reading is compared against the midpoint of the local
    /// readings taken before and after the round trip.
    pub async fn calibrate(&self, store: &dyn DocumentStore) -> Result<i64, StoreError> {
        let before = self.local_ms();
        let server = store.server_timestamp().await?.to_epoch_millis();
        let after = self.local_ms();
        let midpoint = before + (after - before) / 2;
        let offset = self.observe(server - midpoint);
        tracing::debug!(
            "Clock sample: server={} local={} rtt={}ms offset={}ms",
            server,
            midpoint,
            after - before,
            offset
        );
        Ok(offset)
    }

    /// Runs `samples` calibrations, logging and skipping failed round trips.
    pub async fn calibrate_many(&self, store: &dyn DocumentStore, samples: usize) -> i64 {
        for attempt in 0..samples {
            if let Err(e) = self.calibrate(store).await {
                tracing::warn!("Clock calibration attempt {} failed: {}", attempt + 1, e);
            }
        }
        self.offset_ms()
    }
}
