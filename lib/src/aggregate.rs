//! Per-window aggregation of per-subcarrier breathing estimates.
use crate::config::EngineConfig;
use crate::periodicity::estimate_bpm;
use crate::reconstruct::CsiWindow;
use crate::smoothing::preprocess;

/// Breathing rate derived from one window of frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEstimate {
    /// Median of the in-band subcarrier estimates, `0.0` if none
    pub median_bpm: f64,
    /// `median_bpm` rounded half-to-even, `0` if none
    pub bpm: u32,
    /// Number of subcarriers whose estimate fell inside the band
    pub subcarriers_used: usize,
}

impl WindowEstimate {
    /// No subcarrier showed a plausible periodicity.
    pub const NONE: WindowEstimate = WindowEstimate {
        median_bpm: 0.0,
        bpm: 0,
        subcarriers_used: 0,
    };

    pub fn is_periodic(&self) -> bool {
        self.subcarriers_used > 0
    }
}

/// Runs preprocessing and period estimation on every subcarrier of the
/// window, then reduces the in-band results.
pub fn estimate_window(window: &CsiWindow, fs: f64, config: &EngineConfig) -> WindowEstimate {
    let estimates: Vec<f64> = (0..window.subcarrier_count())
        .filter_map(|k| subcarrier_estimate(window, k, fs, config))
        .collect();

    aggregate(&estimates, config.band_bpm)
}

/// Raw estimate for one subcarrier, `None` when its series is too short.
fn subcarrier_estimate(
    window: &CsiWindow,
    subcarrier: usize,
    fs: f64,
    config: &EngineConfig,
) -> Option<f64> {
    let series = window.magnitudes(subcarrier).to_vec();
    if series.len() < 2 {
        log::trace!(
            "Skipping subcarrier {}: {} samples",
            subcarrier,
            series.len()
        );
        return None;
    }

    let smoothed = preprocess(&series, fs, config.poly_order);
    Some(estimate_bpm(&smoothed, fs, config.min_period_secs))
}

/// Keeps estimates inside the inclusive `band` and reduces them to their median.
pub fn aggregate(estimates: &[f64], band: (f64, f64)) -> WindowEstimate {
    let (low, high) = band;
    let mut in_band: Vec<f64> = estimates
        .iter()
        .copied()
        .filter(|bpm| (low..=high).contains(bpm))
        .collect();

    match median(&mut in_band) {
        Some(median_bpm) => WindowEstimate {
            median_bpm,
            bpm: round_bpm(median_bpm),
            subcarriers_used: in_band.len(),
        },
        None => WindowEstimate::NONE,
    }
}

/// Median of the values, averaging the two middle values for even counts.
///
/// Sorts the slice in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Rounds a rate to whole breaths per minute, ties to even.
pub fn round_bpm(bpm: f64) -> u32 {
    bpm.round_ties_even().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CsiFrame;
    use chrono::{Duration, NaiveDate};
    use std::f64::consts::PI;

    #[test]
    fn out_of_band_estimates_are_discarded() {
        let result = aggregate(&[5.0, 12.0, 13.0, 40.0], (8.0, 30.0));
        assert_eq!(result.subcarriers_used, 2);
        assert!((result.median_bpm - 12.5).abs() < 1e-12);
        // 12.5 ties to the even neighbour
        assert_eq!(result.bpm, 12);
    }

    #[test]
    fn ties_round_to_even_in_both_directions() {
        assert_eq!(round_bpm(12.5), 12);
        assert_eq!(round_bpm(13.5), 14);
        assert_eq!(round_bpm(13.4), 13);
        assert_eq!(round_bpm(13.6), 14);
        assert_eq!(aggregate(&[13.0, 14.0], (8.0, 30.0)).bpm, 14);
    }

    #[test]
    fn band_edges_are_inclusive() {
        let result = aggregate(&[8.0, 30.0, 7.999, 30.001], (8.0, 30.0));
        assert_eq!(result.subcarriers_used, 2);
        assert_eq!(result.bpm, 19);
    }

    #[test]
    fn no_surviving_estimates_is_not_periodic() {
        let result = aggregate(&[0.0, 0.0, 45.0], (8.0, 30.0));
        assert_eq!(result, WindowEstimate::NONE);
        assert!(!result.is_periodic());
        assert_eq!(aggregate(&[], (8.0, 30.0)), WindowEstimate::NONE);
    }

    #[test]
    fn median_of_odd_and_even_counts() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    /// 20 frames spread evenly over 15 s, every subcarrier oscillating with
    /// a 4 s period (15 breaths per minute).
    fn breathing_window(subcarriers: usize) -> CsiWindow {
        let start = NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let frames: Vec<CsiFrame> = (0..20)
            .map(|i| {
                let t = i as f64 * 15.0 / 19.0;
                let samples = (0..subcarriers)
                    .flat_map(|k| {
                        let phase = k as f64 * 0.3;
                        let real = 20.0 + 8.0 * (2.0 * PI * t / 4.0 + phase).sin();
                        [real.round() as i32, 1]
                    })
                    .collect();
                CsiFrame::new(start + Duration::microseconds((t * 1e6) as i64), "aa", samples)
            })
            .collect();
        CsiWindow::from_frames(&frames, subcarriers * 2)
    }

    #[test]
    fn synthetic_breathing_window_is_detected() {
        let window = breathing_window(57);
        let fs = window.observed_rate();
        assert!((fs - 20.0 / 15.0).abs() < 1e-3, "fs = {}", fs);

        let result = estimate_window(&window, fs, &EngineConfig::default());
        assert!(result.is_periodic());
        assert!(result.subcarriers_used > 50, "{:?}", result);
        // One lag at this rate spans 15 to 16 breaths per minute
        assert!(
            (14..=16).contains(&result.bpm),
            "Expected ~15 BPM, got {:?}",
            result
        );
    }

    #[test]
    fn flat_window_has_no_periodicity() {
        let start = NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let frames: Vec<CsiFrame> = (0..30)
            .map(|i| CsiFrame::new(start + Duration::milliseconds(500 * i), "aa", vec![7, 7, 7, 7]))
            .collect();
        let window = CsiWindow::from_frames(&frames, 4);
        let result = estimate_window(&window, window.observed_rate(), &EngineConfig::default());
        assert_eq!(result, WindowEstimate::NONE);
    }

    #[test]
    fn single_frame_window_skips_every_subcarrier() {
        let start = NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let window = CsiWindow::from_frames(&[CsiFrame::new(start, "aa", vec![1, 2, 3, 4])], 4);
        let result = estimate_window(&window, window.observed_rate(), &EngineConfig::default());
        assert_eq!(result, WindowEstimate::NONE);
    }
}
