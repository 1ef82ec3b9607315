//! Savitzky-Golay smoothing of per-subcarrier magnitude series.
//!
//! A polynomial of order `p` is least-squares fitted to each window of
//! `2m+1` samples and evaluated at the window centre. The first and last `m`
//! samples are taken from the fits to the first and last full window,
//! evaluated at their own positions, so a polynomial of order `p` passes
//! through the filter unchanged everywhere, edges included.

/// Smoothing window length for a series sampled at `fs` frames per second.
///
/// Roughly one second of samples, bumped to the next odd length, at least 3.
pub fn filter_length(fs: f64) -> usize {
    let mut length = if fs.is_finite() && fs > 0.0 {
        fs.round() as usize
    } else {
        0
    };
    if length < 3 {
        length = 3;
    }
    if length % 2 == 0 {
        length += 1;
    }
    length
}

/// Smooths one subcarrier's magnitude series sampled at `fs`.
///
/// Output has the length of the input.
pub fn preprocess(series: &[f64], fs: f64, poly_order: usize) -> Vec<f64> {
    savgol_smooth(series, filter_length(fs), poly_order)
}

/// Applies a Savitzky-Golay filter of the given window length and order.
///
/// A window longer than the series shrinks to the longest odd length that
/// fits. When the window holds no more samples than the polynomial has
/// coefficients, the fit is exact and the series is returned unchanged.
pub fn savgol_smooth(data: &[f64], window: usize, poly_order: usize) -> Vec<f64> {
    let n = data.len();
    let mut window = window.min(n);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    if window <= poly_order + 1 {
        return data.to_vec();
    }

    let half = window / 2;
    let Some(pinv) = pseudo_inverse(window, poly_order) else {
        log::warn!(
            "Singular Savitzky-Golay system (window {}, order {}); leaving series unsmoothed",
            window,
            poly_order
        );
        return data.to_vec();
    };

    let mut output = vec![0.0; n];

    let centre = evaluation_weights(&pinv, 0.0);
    for i in half..n - half {
        output[i] = dot(&centre, &data[i - half..=i + half]);
    }

    // Edges: evaluate the first and last full-window fits off-centre.
    let head = &data[..window];
    let tail = &data[n - window..];
    for i in 0..half {
        let offset = i as f64 - half as f64;
        output[i] = dot(&evaluation_weights(&pinv, offset), head);
        output[n - 1 - i] = dot(&evaluation_weights(&pinv, -offset), tail);
    }

    output
}

/// Least-squares pseudo-inverse `(J^T J)^-1 J^T` of the Vandermonde matrix
/// `J[i][k] = x_i^k`, with `x_i` running from `-m` to `m`.
///
/// Returns `p` rows of `window` coefficients; row `k` maps the window's
/// samples to the fitted polynomial's `k`-th coefficient.
fn pseudo_inverse(window: usize, poly_order: usize) -> Option<Vec<Vec<f64>>> {
    let half = (window / 2) as f64;
    let p = poly_order + 1;

    let vandermonde: Vec<Vec<f64>> = (0..window)
        .map(|i| {
            let x = i as f64 - half;
            (0..p).map(|k| x.powi(k as i32)).collect()
        })
        .collect();

    // Augmented [J^T J | I] for Gauss-Jordan
    let mut aug = vec![vec![0.0; 2 * p]; p];
    for row in 0..p {
        for col in 0..p {
            aug[row][col] = vandermonde.iter().map(|j| j[row] * j[col]).sum();
        }
        aug[row][p + row] = 1.0;
    }

    for col in 0..p {
        let pivot_row = (col..p).max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))?;
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for value in aug[col].iter_mut() {
            *value /= pivot;
        }

        for row in 0..p {
            if row != col {
                let factor = aug[row][col];
                for k in 0..2 * p {
                    aug[row][k] -= factor * aug[col][k];
                }
            }
        }
    }

    let pinv = (0..p)
        .map(|k| {
            vandermonde
                .iter()
                .map(|j| (0..p).map(|l| aug[k][p + l] * j[l]).sum())
                .collect()
        })
        .collect();
    Some(pinv)
}

/// Weights producing the fitted polynomial's value at `offset` from the window centre.
fn evaluation_weights(pinv: &[Vec<f64>], offset: f64) -> Vec<f64> {
    let window = pinv.first().map_or(0, Vec::len);
    (0..window)
        .map(|i| {
            pinv.iter()
                .enumerate()
                .map(|(k, row)| offset.powi(k as i32) * row[i])
                .sum()
        })
        .collect()
}

fn dot(weights: &[f64], samples: &[f64]) -> f64 {
    weights.iter().zip(samples).map(|(w, x)| w * x).sum()
}
