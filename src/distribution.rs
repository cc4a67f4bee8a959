//! Distribution estimation: equal-width histograms and Gaussian kernel
//! density estimates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bandwidths below this are floored so constant input cannot divide by zero.
const MIN_BANDWIDTH: f64 = 1e-9;

/// One histogram bin over `[lower, upper)`; the last bin is closed above.
///
/// Bins partition the binning domain into equal-width, contiguous,
/// non-overlapping intervals. `frequency` is relative to the *input* length,
/// so the frequencies sum to 1 exactly when no value falls outside the
/// domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub frequency: f64,
}

/// A sampled density curve as parallel `x`/`y` arrays, ready for plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdeCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Bins `values` into `num_bins` equal-width bins.
///
/// The domain is `range` when supplied, otherwise the observed min/max of
/// `values`. Bin edges sit at `min + i * width`; a value exactly at the
/// upper domain bound is clamped into the last bin rather than dropped.
///
/// An explicit `range` lets a subset (e.g. a brushed selection) be binned
/// against the full dataset's domain so the bars stay visually comparable.
/// Values outside an explicit range are skipped, which shows up as the
/// frequencies summing to less than 1.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `values` is empty, `num_bins` is 0,
/// or an explicit range is inverted.
///
/// # Examples
///
/// ```
/// use featurelab::histogram;
///
/// let bins = histogram(&[1.0, 2.0, 3.0, 4.0, 5.0], 5, Some((1.0, 5.0))).unwrap();
/// assert_eq!(bins.len(), 5);
/// assert_eq!(bins[4].count, 1); // the boundary value 5 lands in the last bin
/// ```
pub fn histogram(
    values: &[f64],
    num_bins: usize,
    range: Option<(f64, f64)>,
) -> Result<Vec<HistogramBin>> {
    if values.is_empty() {
        return Err(Error::invalid_input("cannot bin an empty value set"));
    }
    if num_bins == 0 {
        return Err(Error::invalid_input("histogram requires at least one bin"));
    }

    let (min, max) = match range {
        Some((lo, hi)) => {
            if lo > hi {
                return Err(Error::invalid_input(format!(
                    "histogram range is inverted: [{lo}, {hi}]"
                )));
            }
            (lo, hi)
        }
        None => {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for &v in values {
                lo = lo.min(v);
                hi = hi.max(v);
            }
            (lo, hi)
        }
    };

    let width = (max - min) / num_bins as f64;
    let mut counts = vec![0usize; num_bins];
    for &v in values {
        if v < min || v > max {
            continue;
        }
        // Zero-width domains collapse every in-range value into bin 0.
        let index = if width > 0.0 {
            (((v - min) / width) as usize).min(num_bins - 1)
        } else {
            0
        };
        counts[index] += 1;
    }

    let total = values.len() as f64;
    let bins = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + i as f64 * width,
            upper: min + (i + 1) as f64 * width,
            count,
            frequency: count as f64 / total,
        })
        .collect();
    Ok(bins)
}

/// Gaussian kernel density estimate sampled at `n_points` uniform positions.
///
/// The sampling grid spans `[min - pad, max + pad]` with `pad` equal to 10%
/// of the observed range. When `bandwidth` is `None` it defaults to
/// Silverman's rule, `h = 1.06 * sigma * n^(-1/5)`; the bandwidth is floored
/// above zero either way, so constant input yields a finite spike rather
/// than a division by zero.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `values` is empty or `n_points < 2`.
pub fn kernel_density(
    values: &[f64],
    bandwidth: Option<f64>,
    n_points: usize,
) -> Result<KdeCurve> {
    if values.is_empty() {
        return Err(Error::invalid_input(
            "cannot estimate a density from an empty value set",
        ));
    }
    if n_points < 2 {
        return Err(Error::invalid_input(
            "kernel density estimation requires at least two sample points",
        ));
    }

    let n = values.len() as f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let mean = sum / n;

    let h = bandwidth
        .unwrap_or_else(|| {
            let variance = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
            1.06 * variance.sqrt() * n.powf(-0.2)
        })
        .max(MIN_BANDWIDTH);

    let pad = 0.1 * (max - min);
    let lo = min - pad;
    let hi = max + pad;
    let step = (hi - lo) / (n_points - 1) as f64;

    let norm = 1.0 / (n * h * (2.0 * std::f64::consts::PI).sqrt());
    let mut x = Vec::with_capacity(n_points);
    let mut y = Vec::with_capacity(n_points);
    for i in 0..n_points {
        let xi = lo + i as f64 * step;
        let density = values
            .iter()
            .map(|&v| {
                let u = (xi - v) / h;
                (-0.5 * u * u).exp()
            })
            .sum::<f64>()
            * norm;
        x.push(xi);
        y.push(density);
    }

    Ok(KdeCurve { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn histogram_counts_every_value_once() {
        let values = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
        let bins = histogram(&values, 4, None).unwrap();
        assert_eq!(bins.len(), 4);
        let total: usize = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, values.len());
        let freq_sum: f64 = bins.iter().map(|b| b.frequency).sum();
        assert_abs_diff_eq!(freq_sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn histogram_boundary_value_lands_in_last_bin() {
        let bins = histogram(&[1.0, 2.0, 3.0, 4.0, 5.0], 5, Some((1.0, 5.0))).unwrap();
        assert_eq!(bins.len(), 5);
        for bin in &bins {
            assert_abs_diff_eq!(bin.upper - bin.lower, 0.8, epsilon = 1e-12);
        }
        // One value per bin, except the last absorbs the boundary value 5.
        assert_eq!(
            bins.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![1, 1, 1, 1, 1]
        );
        assert_abs_diff_eq!(bins[4].upper, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn histogram_bins_are_contiguous() {
        let bins = histogram(&[0.0, 10.0], 4, None).unwrap();
        for pair in bins.windows(2) {
            assert_abs_diff_eq!(pair[0].upper, pair[1].lower, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(bins[0].lower, 0.0);
        assert_abs_diff_eq!(bins[3].upper, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn histogram_external_range_skips_outliers() {
        let values = [0.5, 1.0, 2.0, 9.0];
        let bins = histogram(&values, 2, Some((1.0, 3.0))).unwrap();
        let total: usize = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 2);
        let freq_sum: f64 = bins.iter().map(|b| b.frequency).sum();
        assert!(freq_sum < 1.0);
    }

    #[test]
    fn histogram_constant_values() {
        let bins = histogram(&[3.0; 4], 3, None).unwrap();
        assert_eq!(bins[0].count, 4);
        assert_eq!(bins[1].count, 0);
        assert_eq!(bins[2].count, 0);
    }

    #[test]
    fn histogram_rejects_bad_input() {
        assert!(histogram(&[], 4, None).is_err());
        assert!(histogram(&[1.0], 0, None).is_err());
        assert!(histogram(&[1.0], 2, Some((5.0, 1.0))).is_err());
    }

    #[test]
    fn kde_outputs_are_finite_and_non_negative() {
        let values = [1.0, 2.0, 2.5, 3.0, 10.0];
        let curve = kernel_density(&values, None, 50).unwrap();
        assert_eq!(curve.x.len(), 50);
        assert_eq!(curve.y.len(), 50);
        for (&x, &y) in curve.x.iter().zip(curve.y.iter()) {
            assert!(x.is_finite());
            assert!(y.is_finite());
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn kde_grid_covers_padded_range() {
        let curve = kernel_density(&[0.0, 10.0], Some(1.0), 11).unwrap();
        assert_abs_diff_eq!(curve.x[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(curve.x[10], 11.0, epsilon = 1e-12);
    }

    #[test]
    fn kde_constant_input_does_not_blow_up() {
        let curve = kernel_density(&[5.0; 10], None, 16).unwrap();
        for &y in &curve.y {
            assert!(y.is_finite());
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn kde_density_peaks_near_data() {
        let values = [0.0, 0.1, -0.1, 0.05];
        let curve = kernel_density(&values, None, 101).unwrap();
        let peak_idx = curve
            .y
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!(curve.x[peak_idx].abs() < 0.2);
    }

    #[test]
    fn kde_rejects_bad_input() {
        assert!(kernel_density(&[], None, 10).is_err());
        assert!(kernel_density(&[1.0], None, 1).is_err());
    }
}
