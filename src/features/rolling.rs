//! Per-city series helpers: gap filling, trailing windows and lags.
//!
//! All functions operate on a single city's values in date order.

/// Forward-fill then backward-fill missing values.
///
/// Returns `None` when every value is missing.
pub fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().copied().find(|v| v.is_finite())?;

    let mut filled = Vec::with_capacity(values.len());
    let mut last = None;
    for value in values {
        match value {
            Some(v) if v.is_finite() => {
                last = Some(*v);
                filled.push(*v);
            }
            // Leading gaps take the first observed value
            _ => filled.push(last.unwrap_or(first)),
        }
    }

    Some(filled)
}

/// Trailing mean over `window` rows, using however many rows exist (min_periods = 1)
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Trailing sample standard deviation over `window` rows.
///
/// A window holding a single value has zero spread.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            sample_std(&values[start..=i])
        })
        .collect()
}

/// Shift values down by `lag` rows, filling the head with `fill`
pub fn lag(values: &[f64], lag: usize, fill: f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { fill })
        .collect()
}

fn sample_std(window: &[f64]) -> f64 {
    let n = window.len();
    if n < 2 {
        return 0.0;
    }
    let mean = window.iter().sum::<f64>() / n as f64;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}
