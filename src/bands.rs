use ndarray::{Array2, Axis};

/// Lower/upper percentile bounds per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileBand {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Converts a per-unit prediction distribution into percentile bands.
///
/// The bounds are plain order statistics of whatever the adapter put into
/// the distribution; they are a heuristic interval, not a calibrated one,
/// and are never clipped against the main prediction (for the staged
/// family a bound can legitimately sit on either side of it).
#[derive(Debug, Clone, Copy)]
pub struct UncertaintyEstimator {
    lower_pct: f64,
    upper_pct: f64,
}

impl Default for UncertaintyEstimator {
    fn default() -> Self {
        Self {
            lower_pct: 5.0,
            upper_pct: 95.0,
        }
    }
}

impl UncertaintyEstimator {
    pub fn new(lower_pct: f64, upper_pct: f64) -> Self {
        Self {
            lower_pct,
            upper_pct,
        }
    }

    /// Per-sample bands across the unit axis of a units x samples
    /// distribution. An empty unit axis yields NaN bounds; callers skip
    /// banding before it comes to that.
    pub fn bands(&self, distribution: &Array2<f64>) -> PercentileBand {
        let n_samples = distribution.ncols();
        let mut lower = Vec::with_capacity(n_samples);
        let mut upper = Vec::with_capacity(n_samples);

        for sample in distribution.axis_iter(Axis(1)) {
            let mut units: Vec<f64> = sample.to_vec();
            units.sort_by(|a, b| a.total_cmp(b));
            lower.push(percentile(&units, self.lower_pct));
            upper.push(percentile(&units, self.upper_pct));
        }

        PercentileBand { lower, upper }
    }
}

/// Linear-interpolation percentile over an ascending slice: rank
/// `q / 100 * (n - 1)` interpolated between the two bracketing order
/// statistics.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }

    let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
