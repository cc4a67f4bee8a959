//! Pairwise Pearson correlation over a feature subset.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::FeatureVector;

/// Square, symmetric correlation matrix with its ordered feature labels.
///
/// The diagonal is 1 and every entry lies in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    labels: Vec<String>,
    values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Feature labels, in the order the rows/columns were supplied.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Correlation between features `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// Number of features covered by this matrix.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Pearson correlation coefficient between two equal-length vectors.
///
/// Means are taken in a first pass, then cross- and auto-products are
/// accumulated in vector order in a second pass; the accumulation order is
/// fixed so repeated runs on identical input produce bit-identical results.
///
/// If either vector has zero variance the correlation is defined as 0.0,
/// never NaN. Callers are responsible for passing equal-length slices;
/// [`correlation_matrix`] validates this for whole feature sets.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    if x.is_empty() {
        return 0.0;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cross = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cross += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cross / (var_x.sqrt() * var_y.sqrt())
}

/// Computes the full pairwise correlation matrix for a feature subset.
///
/// Each unordered pair is computed once and mirrored; the diagonal is set
/// to 1.0 directly rather than recomputed.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `features` is empty, any vector is
/// empty, or the vectors disagree on sample count.
pub fn correlation_matrix(features: &[FeatureVector]) -> Result<CorrelationMatrix> {
    if features.is_empty() {
        return Err(Error::invalid_input(
            "correlation matrix requires at least one feature vector",
        ));
    }
    let n_samples = features[0].len();
    if n_samples == 0 {
        return Err(Error::invalid_input(
            "correlation matrix requires non-empty feature vectors",
        ));
    }
    for feature in features {
        if feature.len() != n_samples {
            return Err(Error::invalid_input(format!(
                "feature '{}' has {} samples, expected {}",
                feature.name,
                feature.len(),
                n_samples
            )));
        }
    }

    let k = features.len();
    let mut values = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        values[[i, i]] = 1.0;
        for j in (i + 1)..k {
            let r = pearson(&features[i].values, &features[j].values);
            values[[i, j]] = r;
            values[[j, i]] = r;
        }
    }

    Ok(CorrelationMatrix {
        labels: features.iter().map(|f| f.name.clone()).collect(),
        values,
    })
}
