//! Engine constants for a deployment.

use std::time::Duration;

/// Raw sample vector length for the observed ESP32 firmware (57 subcarriers).
pub const DEFAULT_EXPECTED_LEN: usize = 114;

/// Shortest breathing period considered by the autocorrelation search.
pub const DEFAULT_MIN_PERIOD_SECS: f64 = 1.2;

/// Plausible human breathing rates, in breaths per minute.
pub const DEFAULT_BAND_BPM: (f64, f64) = (8.0, 30.0);

pub const DEFAULT_WINDOW_SECS: f64 = 20.0;
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(20);
pub const DEFAULT_POLY_ORDER: usize = 2;

/// Parameters of the breathing-rate engine.
///
/// `Default` yields the values of the reference deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Length of the query window, in seconds.
    pub window_secs: f64,
    /// Lags below `min_period_secs * fs` are excluded from the peak search.
    pub min_period_secs: f64,
    /// Inclusive band of accepted per-subcarrier estimates.
    pub band_bpm: (f64, f64),
    /// Delay after start-up before the service answers queries.
    pub warmup: Duration,
    /// Expected raw sample vector length (interleaved I/Q, so twice the subcarrier count).
    pub expected_len: usize,
    /// Polynomial order of the smoothing filter.
    pub poly_order: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            min_period_secs: DEFAULT_MIN_PERIOD_SECS,
            band_bpm: DEFAULT_BAND_BPM,
            warmup: DEFAULT_WARMUP,
            expected_len: DEFAULT_EXPECTED_LEN,
            poly_order: DEFAULT_POLY_ORDER,
        }
    }
}

impl EngineConfig {
    /// Number of subcarriers implied by the expected vector length.
    pub fn subcarriers(&self) -> usize {
        self.expected_len / 2
    }

    /// Window length as a chrono duration, with microsecond resolution.
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::microseconds((self.window_secs * 1e6).round() as i64)
    }

    pub fn with_window_secs(mut self, window_secs: f64) -> Self {
        self.window_secs = window_secs;
        self
    }

    pub fn with_expected_len(mut self, expected_len: usize) -> Self {
        self.expected_len = expected_len;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = EngineConfig::default();
        assert_eq!(config.subcarriers(), 57);
        assert_eq!(config.band_bpm, (8.0, 30.0));
        assert_eq!(config.warmup, Duration::from_secs(20));
        assert_eq!(config.window(), chrono::Duration::seconds(20));
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_window_secs(15.0)
            .with_expected_len(234)
            .with_warmup(Duration::ZERO);
        assert_eq!(config.subcarriers(), 117);
        assert_eq!(config.window(), chrono::Duration::seconds(15));
        assert_eq!(config.warmup, Duration::ZERO);
    }
}
