//! Offline sliding-window evaluation over the stored history.
use crate::aggregate::estimate_window;
use crate::config::EngineConfig;
use crate::errors::StoreError;
use crate::frame::{CsiFrame, ReceiptTime};
use crate::reconstruct::CsiWindow;
use crate::store::FrameStore;

/**
 * Breathing rate of one replayed window `[window_start, window_end)`
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayWindow {
    pub window_start: ReceiptTime,
    pub window_end: ReceiptTime,
    /// Valid frames divided by the nominal window length
    pub sampling_rate_hz: f64,
    pub median_bpm: f64,
    pub bpm: u32,
    pub frames: usize,
}

/// Slides a window of `config.window_secs` over everything in the store,
/// advancing by `step_secs`.
///
/// Windows are half-open and only placed while they end at or before the
/// newest frame. Windows without a valid frame are skipped.
pub fn replay<S: FrameStore>(
    store: &S,
    config: &EngineConfig,
    step_secs: f64,
) -> Result<Vec<ReplayWindow>, StoreError> {
    if !(step_secs > 0.0) || !(config.window_secs > 0.0) {
        log::warn!(
            "Replay needs positive window and step, got {}s and {}s",
            config.window_secs,
            step_secs
        );
        return Ok(Vec::new());
    }

    let Some((first, last)) = store.time_span()? else {
        log::info!("Frame store is empty; nothing to replay.");
        return Ok(Vec::new());
    };

    let step = chrono::Duration::microseconds((step_secs * 1e6).round() as i64);
    if step <= chrono::Duration::zero() {
        log::warn!("Replay step of {}s is below the timestamp resolution", step_secs);
        return Ok(Vec::new());
    }

    let history = store.fetch_frames(first, last)?;
    let window_len = config.window();
    log::info!(
        "Replaying {} frames from {} to {} ({}s windows, {}s step)",
        history.len(),
        first,
        last,
        config.window_secs,
        step_secs
    );

    let mut results = Vec::new();
    let mut start = first;
    while let Some(end) = start
        .checked_add_signed(window_len)
        .filter(|end| *end <= last)
    {
        if let Some(window) = evaluate_window(&history, start, end, config) {
            log::debug!(
                "{}, fs = {:.2}, BPM = {}",
                window.window_end,
                window.sampling_rate_hz,
                window.bpm
            );
            results.push(window);
        }
        match start.checked_add_signed(step) {
            Some(next) => start = next,
            None => break,
        }
    }

    Ok(results)
}

fn evaluate_window(
    history: &[CsiFrame],
    start: ReceiptTime,
    end: ReceiptTime,
    config: &EngineConfig,
) -> Option<ReplayWindow> {
    // History is sorted by receipt time
    let lo = history.partition_point(|f| f.received_at < start);
    let hi = history.partition_point(|f| f.received_at < end);
    if lo >= hi {
        return None;
    }

    let window = CsiWindow::from_frames(&history[lo..hi], config.expected_len);
    if window.is_empty() {
        log::debug!("No valid frames in window starting {}", start);
        return None;
    }

    let fs = window.frame_count() as f64 / config.window_secs;
    let estimate = estimate_window(&window, fs, config);

    Some(ReplayWindow {
        window_start: start,
        window_end: end,
        sampling_rate_hz: fs,
        median_bpm: estimate.median_bpm,
        bpm: estimate.bpm,
        frames: window.frame_count(),
    })
}

/// Mean of the rounded rates of all windows.
pub fn mean_bpm(windows: &[ReplayWindow]) -> Option<f64> {
    if windows.is_empty() {
        return None;
    }
    let total: f64 = windows.iter().map(|w| w.bpm as f64).sum();
    Some(total / windows.len() as f64)
}
