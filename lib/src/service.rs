//! On-demand breathing-rate queries
//!
//! Every query reads the most recent window from the store and computes a
//! fresh estimate; nothing is cached between calls. Until the warm-up delay
//! has elapsed after start-up, queries are turned away without touching the
//! store.

use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::aggregate::estimate_window;
use crate::config::EngineConfig;
use crate::errors::StoreError;
use crate::frame::ReceiptTime;
use crate::reconstruct::CsiWindow;
use crate::store::FrameStore;

/// One-way readiness flag shared between the warm-up timer and queries.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    /// A flag that starts out warming up.
    pub fn warming_up() -> Self {
        Self::default()
    }

    /// A flag that is ready from the start.
    pub fn ready() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Marks the flag ready. Later calls have no effect.
    pub fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            log::info!("Breathing-rate queries are now ready.");
        }
    }

    /// Spawns a timer thread that marks the flag ready after `delay`.
    pub fn arm(&self, delay: Duration) -> JoinHandle<()> {
        log::trace!("Arming readiness timer for {:?}", delay);
        let readiness = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            readiness.mark_ready();
        })
    }
}

/// A computed breathing rate for the window ending at `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct BpmEstimate {
    /// Query time
    pub timestamp: ReceiptTime,
    /// Frames per second observed within the window
    pub sampling_rate_hz: f64,
    /// Rounded median rate, `0` when no subcarrier showed a plausible period
    pub bpm: u32,
    /// Unrounded median rate
    pub median_bpm: f64,
    pub subcarriers_used: usize,
    pub frames_used: usize,
    /// Frames in the window dropped by the reconstructor
    pub frames_rejected: usize,
}

impl BpmEstimate {
    /// Whether any subcarrier produced an in-band rate.
    pub fn is_periodic(&self) -> bool {
        self.subcarriers_used > 0
    }
}

/// Result of a breathing-rate query.
#[derive(Debug, Clone, PartialEq)]
pub enum BpmOutcome {
    /// Queried before the warm-up delay elapsed
    NotReady,
    /// No usable frame in the window
    InsufficientData,
    Estimate(BpmEstimate),
}

impl BpmOutcome {
    /// Rate in breaths per minute, `0` for anything but an estimate.
    pub fn bpm(&self) -> u32 {
        match self {
            BpmOutcome::Estimate(estimate) => estimate.bpm,
            _ => 0,
        }
    }
}

/// Breathing-rate engine bound to a frame store.
pub struct BpmService<S> {
    store: S,
    config: EngineConfig,
    readiness: Readiness,
}

impl<S: FrameStore> BpmService<S> {
    /// Creates a service that is warming up. Call [`Self::start_warmup`] to
    /// arm the timer.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_readiness(store, config, Readiness::warming_up())
    }

    /// Creates a service that answers queries immediately.
    pub fn ready(store: S, config: EngineConfig) -> Self {
        Self::with_readiness(store, config, Readiness::ready())
    }

    pub fn with_readiness(store: S, config: EngineConfig, readiness: Readiness) -> Self {
        Self {
            store,
            config,
            readiness,
        }
    }

    /// Arms the warm-up timer with the configured delay.
    pub fn start_warmup(&self) -> JoinHandle<()> {
        self.readiness.arm(self.config.warmup)
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Breathing rate over the window ending at `now`.
    pub fn get_bpm(&self, now: ReceiptTime) -> Result<BpmOutcome, StoreError> {
        if !self.is_ready() {
            return Ok(BpmOutcome::NotReady);
        }

        // A window reaching past the calendar covers the whole history
        let start = now
            .checked_sub_signed(self.config.window())
            .unwrap_or(NaiveDateTime::MIN);
        let frames = self.store.fetch_frames(start, now)?;
        if frames.is_empty() {
            log::debug!("No frames in the {}s window ending {}", self.config.window_secs, now);
            return Ok(BpmOutcome::InsufficientData);
        }

        let window = CsiWindow::from_frames(&frames, self.config.expected_len);
        if window.is_empty() {
            log::debug!(
                "All {} frames in the window ending {} were rejected",
                window.rejected,
                now
            );
            return Ok(BpmOutcome::InsufficientData);
        }

        let fs = window.observed_rate();
        let result = estimate_window(&window, fs, &self.config);

        Ok(BpmOutcome::Estimate(BpmEstimate {
            timestamp: now,
            sampling_rate_hz: fs,
            bpm: result.bpm,
            median_bpm: result.median_bpm,
            subcarriers_used: result.subcarriers_used,
            frames_used: window.frame_count(),
            frames_rejected: window.rejected,
        }))
    }
}
