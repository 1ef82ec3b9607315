//! Complex signal reconstruction from interleaved I/Q sample vectors.
//!
//! Each accepted frame becomes one row of a `(frames, subcarriers)` matrix of
//! complex channel values. Frames of the wrong length are rejected per item.
use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;

use crate::errors::FrameRejection;
use crate::frame::{CsiFrame, ReceiptTime};

/// Complex channel response of all subcarriers for one frame.
pub type SubcarrierVector = Array1<Complex64>;

/// Converts one raw sample vector into its complex subcarrier values.
///
/// Value `k` is `samples[2k] + i * samples[2k + 1]`.
pub fn to_complex(samples: &[i32], expected_len: usize) -> Result<SubcarrierVector, FrameRejection> {
    if samples.len() != expected_len || samples.len() % 2 != 0 {
        return Err(FrameRejection::UnexpectedLength {
            expected: expected_len,
            actual: samples.len(),
        });
    }

    Ok(samples
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0] as f64, pair[1] as f64))
        .collect())
}

/// The reconstructed frames of one estimation window.
#[derive(Debug, Clone)]
pub struct CsiWindow {
    /// Receipt times of the accepted frames, ascending
    pub timestamps: Vec<ReceiptTime>,
    /// One row per accepted frame, one column per subcarrier
    pub csi: Array2<Complex64>,
    /// Number of frames excluded by the reconstructor
    pub rejected: usize,
}

impl CsiWindow {
    /// Reconstructs every frame, dropping those with an unexpected length.
    pub fn from_frames(frames: &[CsiFrame], expected_len: usize) -> Self {
        let subcarriers = expected_len / 2;
        let mut timestamps = Vec::with_capacity(frames.len());
        let mut values = Vec::with_capacity(frames.len() * subcarriers);
        let mut rejected = 0;

        for frame in frames {
            match to_complex(&frame.samples, expected_len) {
                Ok(vector) => {
                    timestamps.push(frame.received_at);
                    values.extend(vector.iter().copied());
                }
                Err(e) => {
                    log::debug!(
                        "Dropping frame from {} received at {}: {}",
                        frame.station,
                        frame.received_at,
                        e
                    );
                    rejected += 1;
                }
            }
        }

        if rejected > 0 {
            log::debug!(
                "Reconstructed {} frames, rejected {}",
                timestamps.len(),
                rejected
            );
        }

        let rows = timestamps.len();
        debug_assert_eq!(values.len(), rows * subcarriers);
        let csi = match Array2::from_shape_vec((rows, subcarriers), values) {
            Ok(csi) => csi,
            Err(e) => {
                // Only accepted frames push exactly `subcarriers` values each
                log::error!(
                    "CSI buffer does not fit {} frames of {} subcarriers: {}",
                    rows,
                    subcarriers,
                    e
                );
                Array2::zeros((0, subcarriers))
            }
        };

        Self {
            timestamps,
            csi,
            rejected,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.csi.nrows()
    }

    pub fn subcarrier_count(&self) -> usize {
        self.csi.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Magnitude time series of one subcarrier across the window.
    pub fn magnitudes(&self, subcarrier: usize) -> Array1<f64> {
        magnitudes(self.csi.column(subcarrier))
    }

    /// Seconds between the first and last accepted frame.
    pub fn elapsed_secs(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => {
                (*last - *first).num_microseconds().unwrap_or(0) as f64 * 1e-6
            }
            _ => 0.0,
        }
    }

    /// Frames per second observed over the window's own span.
    ///
    /// A span of zero or less (one frame, identical timestamps, clock skew)
    /// is treated as one second.
    pub fn observed_rate(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        let duration = if elapsed <= 0.0 { 1.0 } else { elapsed };
        self.frame_count() as f64 / duration
    }
}

fn magnitudes(column: ArrayView1<Complex64>) -> Array1<f64> {
    column.mapv(|c| c.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn base() -> ReceiptTime {
        NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn interleaved_samples_become_complex_values() {
        let result = to_complex(&[3, 4, -1, 2, 0, -5], 6).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], Complex64::new(3.0, 4.0));
        assert_eq!(result[1], Complex64::new(-1.0, 2.0));
        assert_eq!(result[2], Complex64::new(0.0, -5.0));
        assert!((result[0].norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            to_complex(&[1, 2, 3, 4], 6),
            Err(FrameRejection::UnexpectedLength {
                expected: 6,
                actual: 4
            })
        );
        // Odd lengths never match an even expectation
        assert!(to_complex(&[1, 2, 3, 4, 5], 6).is_err());
        assert!(to_complex(&[1, 2, 3], 3).is_err());
    }

    #[test]
    fn window_excludes_malformed_frames() {
        let frames = vec![
            CsiFrame::new(base(), "aa", vec![1, 0, 2, 0]),
            CsiFrame::new(base() + Duration::seconds(1), "aa", vec![1, 0, 2]),
            CsiFrame::new(base() + Duration::seconds(2), "aa", vec![3, 4, 0, 1]),
        ];
        let window = CsiWindow::from_frames(&frames, 4);

        assert_eq!(window.frame_count(), 2);
        assert_eq!(window.subcarrier_count(), 2);
        assert_eq!(window.rejected, 1);
        assert_eq!(window.magnitudes(0).to_vec(), vec![1.0, 5.0]);
        assert_eq!(window.magnitudes(1).to_vec(), vec![2.0, 1.0]);
        assert_eq!(window.timestamps[1], base() + Duration::seconds(2));
    }

    #[test]
    fn odd_expected_length_rejects_every_frame() {
        let frames = vec![
            CsiFrame::new(base(), "aa", vec![1, 0, 2, 0, 7]),
            CsiFrame::new(base() + Duration::seconds(1), "aa", vec![1, 0, 2, 0]),
        ];
        let window = CsiWindow::from_frames(&frames, 5);

        assert!(window.is_empty());
        assert_eq!(window.subcarrier_count(), 2);
        assert_eq!(window.rejected, 2);
        assert!(window.timestamps.is_empty());
    }

    #[test]
    fn observed_rate_uses_span_between_frames() {
        let frames: Vec<CsiFrame> = (0..11)
            .map(|i| CsiFrame::new(base() + Duration::milliseconds(500 * i), "aa", vec![1, 1]))
            .collect();
        let window = CsiWindow::from_frames(&frames, 2);
        assert!((window.elapsed_secs() - 5.0).abs() < 1e-9);
        assert!((window.observed_rate() - 2.2).abs() < 1e-9);
    }

    #[test]
    fn identical_timestamps_clamp_to_one_second() {
        let frames: Vec<CsiFrame> = (0..7)
            .map(|_| CsiFrame::new(base(), "aa", vec![1, 1]))
            .collect();
        let window = CsiWindow::from_frames(&frames, 2);
        assert_eq!(window.elapsed_secs(), 0.0);
        assert_eq!(window.observed_rate(), 7.0);
    }

    #[test]
    fn empty_window_has_no_frames() {
        let window = CsiWindow::from_frames(&[], 114);
        assert!(window.is_empty());
        assert_eq!(window.subcarrier_count(), 57);
        assert_eq!(window.observed_rate(), 0.0);
    }
}
