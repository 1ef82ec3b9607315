//! Dominant-period detection by autocorrelation peak picking.

/// Normalised autocorrelation of the mean-subtracted series, non-negative lags only.
///
/// Lag zero is 1.0 unless the series carries no energy, in which case every
/// lag is 0.0.
pub fn autocorrelation(series: &[f64]) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }

    let mean = series.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = series.iter().map(|x| x - mean).collect();

    let mut acf: Vec<f64> = (0..n)
        .map(|lag| {
            centred[..n - lag]
                .iter()
                .zip(&centred[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect();

    let energy = acf[0];
    if energy > 0.0 {
        for value in acf.iter_mut() {
            *value /= energy;
        }
    }
    acf
}

/// Estimates a rate in breaths per minute from the series' dominant period.
///
/// Lags shorter than `min_period_secs * fs` samples are excluded; the largest
/// remaining autocorrelation value wins, earliest lag on ties. Returns `0.0`
/// for fewer than two samples, a series without energy, or when the excluded
/// zone covers every lag. The result is not band-limited.
pub fn estimate_bpm(series: &[f64], fs: f64, min_period_secs: f64) -> f64 {
    if series.len() < 2 || !(fs > 0.0) || !fs.is_finite() {
        return 0.0;
    }

    let acf = autocorrelation(series);
    if acf[0] <= 0.0 {
        return 0.0;
    }

    let min_lag = (min_period_secs * fs) as usize;
    if min_lag >= acf.len() {
        return 0.0;
    }

    let peak_lag = min_lag + first_max(&acf[min_lag..]);
    if peak_lag == 0 {
        return 0.0;
    }

    let period_secs = peak_lag as f64 / fs;
    60.0 / period_secs
}

/// Index of the first occurrence of the maximum value.
fn first_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = i;
        }
    }
    best
}
