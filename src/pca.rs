//! Covariance-based principal component analysis.
//!
//! The decomposition is computed from scratch: per-feature standardization,
//! an explicit covariance matrix, then repeated power iteration with
//! deflation to peel off the top-k eigenpairs. Power iteration is exact for
//! the symmetric positive semi-definite covariance matrix, but converges
//! slowly when two eigenvalues are nearly equal; the iteration cap bounds
//! the work in that case and the affected component is reported as-is.

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Power iteration stops when successive iterates differ by less than this
/// in L2 norm.
const CONVERGENCE_TOLERANCE: f64 = 1e-10;

/// Upper bound on power-iteration steps per component.
const MAX_POWER_ITERATIONS: usize = 1000;

/// A fitted principal component model.
///
/// Immutable once built: recomputing with different data or a different
/// component count produces a new model. The external feature registry owns
/// identity and lifecycle of stored models; this type is plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaModel {
    /// Principal axes as rows, shape (k, p). Rows have unit norm; an axis
    /// requested beyond the data's numerical rank is all zeros.
    components: Array2<f64>,
    /// Eigenvalues of the covariance matrix, descending.
    eigenvalues: Vec<f64>,
    /// Per-feature means of the training data, shape (p).
    means: Array1<f64>,
    /// Per-feature population standard deviations, shape (p). Zero
    /// deviations are floored to 1.0 so constant features standardize to 0.
    stds: Array1<f64>,
    /// Fraction of the total covariance-trace variance captured by each
    /// component; sums to less than 1 when k < p.
    explained_variance_ratio: Vec<f64>,
}

impl PcaModel {
    /// Fits a model to `data` (n samples × p features), keeping
    /// `n_components` principal components.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `data` has fewer than 2 samples, no
    ///   features, or `n_components` is 0.
    /// - [`Error::DimensionMismatch`] if `n_components` exceeds
    ///   `min(n_samples, n_features)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use featurelab::PcaModel;
    /// use ndarray::array;
    ///
    /// let data = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
    /// let model = PcaModel::fit(&data, 1).unwrap();
    /// assert_eq!(model.n_components(), 1);
    /// assert!(model.explained_variance_ratio()[0] > 0.99);
    /// ```
    pub fn fit(data: &Array2<f64>, n_components: usize) -> Result<PcaModel> {
        let n_samples = data.nrows();
        let n_features = data.ncols();

        if n_samples < 2 {
            return Err(Error::invalid_input("PCA requires at least 2 samples"));
        }
        if n_features < 1 {
            return Err(Error::invalid_input("PCA requires at least 1 feature"));
        }
        if n_components == 0 {
            return Err(Error::invalid_input(
                "PCA requires at least 1 requested component",
            ));
        }
        let max_components = n_samples.min(n_features);
        if n_components > max_components {
            return Err(Error::DimensionMismatch {
                what: "principal components",
                expected: max_components,
                actual: n_components,
            });
        }

        // Standardize with population statistics; zero deviations floor to
        // 1.0 so constant features contribute zeros instead of NaN columns.
        let means = data
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::invalid_input("failed to compute feature means"))?;
        let raw_stds = data.map_axis(Axis(0), |column| column.std(0.0));
        let stds = raw_stds.mapv(|s| if s.abs() < 1e-9 { 1.0 } else { s });

        let mut standardized = data.to_owned();
        standardized -= &means;
        standardized /= &stds;

        let mut working = standardized.t().dot(&standardized);
        working /= (n_samples - 1) as f64;
        let total_variance: f64 = working.diag().sum();

        let mut eig_pairs: Vec<(f64, Array1<f64>)> = Vec::with_capacity(n_components);
        for component_index in 0..n_components {
            let (eigenvalue, eigenvector, iterations, converged) =
                dominant_eigenpair(&working);
            if !converged {
                warn!(
                    "power iteration for component {component_index} hit the \
                     {MAX_POWER_ITERATIONS}-iteration cap (nearly equal eigenvalues?)"
                );
            }
            debug!(
                "component {component_index}: eigenvalue {eigenvalue:.6e} \
                 after {iterations} iteration(s)"
            );

            // Deflate so the next round converges to the next eigenpair.
            for i in 0..n_features {
                for j in 0..n_features {
                    working[[i, j]] -= eigenvalue * eigenvector[i] * eigenvector[j];
                }
            }

            eig_pairs.push((eigenvalue, eigenvector));
        }

        // Deflation yields the pairs in descending order up to rounding;
        // sort to make the model invariant unconditional.
        eig_pairs.sort_by(|(a, _), (b, _)| {
            b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut components = Array2::<f64>::zeros((n_components, n_features));
        let mut eigenvalues = Vec::with_capacity(n_components);
        for (component_index, (eigenvalue, eigenvector)) in eig_pairs.into_iter().enumerate() {
            components.row_mut(component_index).assign(&eigenvector);
            eigenvalues.push(eigenvalue);
        }

        let explained_variance_ratio = eigenvalues
            .iter()
            .map(|&lambda| {
                if total_variance > 0.0 {
                    lambda / total_variance
                } else {
                    0.0
                }
            })
            .collect();

        info!(
            "fitted PCA: {n_samples} samples x {n_features} features, \
             {n_components} component(s), total variance {total_variance:.6e}"
        );

        Ok(PcaModel {
            components,
            eigenvalues,
            means,
            stds,
            explained_variance_ratio,
        })
    }

    /// Projects `data` (n × p) into component space, yielding scores of
    /// shape (n × k). The input is standardized with the model's stored
    /// means and deviations first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the column count differs
    /// from the fitted feature count.
    pub fn project(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let n_features = self.n_features();
        if data.ncols() != n_features {
            return Err(Error::DimensionMismatch {
                what: "projection feature count",
                expected: n_features,
                actual: data.ncols(),
            });
        }
        let mut standardized = data.to_owned();
        standardized -= &self.means;
        standardized /= &self.stds;
        Ok(standardized.dot(&self.components.t()))
    }

    /// Maps projected scores (n × k) back into the original feature space,
    /// undoing both the rotation and the standardization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the column count differs
    /// from the fitted component count.
    pub fn reconstruct(&self, projected: &Array2<f64>) -> Result<Array2<f64>> {
        let n_components = self.n_components();
        if projected.ncols() != n_components {
            return Err(Error::DimensionMismatch {
                what: "reconstruction component count",
                expected: n_components,
                actual: projected.ncols(),
            });
        }
        let mut reconstructed = projected.dot(&self.components);
        reconstructed *= &self.stds;
        reconstructed += &self.means;
        Ok(reconstructed)
    }

    /// Principal axes as rows, shape (k, p); each row has unit norm.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Covariance eigenvalues in descending order.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Per-feature training means.
    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    /// Per-feature sanitized training deviations.
    pub fn stds(&self) -> &Array1<f64> {
        &self.stds
    }

    /// Fraction of total variance captured per component.
    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }
}

/// Iterates below this norm mean the seed lies in the matrix's null space.
const NULL_SPACE_FLOOR: f64 = 1e-12;

/// Power iteration for the dominant eigenpair of a symmetric PSD matrix.
///
/// Starts from the uniform unit vector `1/sqrt(p)` and iterates
/// `w = A v; v = w / ||w||` until successive iterates differ by less than
/// [`CONVERGENCE_TOLERANCE`] in L2 norm or [`MAX_POWER_ITERATIONS`] elapse.
/// The eigenvalue is the Rayleigh quotient `v' A v`, clamped non-negative.
///
/// The uniform seed can land exactly in the null space of a deflated
/// matrix (for two standardized features the eigenvectors are exactly
/// `(1, ±1)/sqrt(2)`, one of which is the seed); in that case the
/// iteration restarts from standard basis vectors before concluding the
/// matrix is exhausted. Entries stay O(1) after standardization, so the
/// absolute null-space floor is sound.
///
/// Returns `(eigenvalue, eigenvector, iterations, converged)`.
fn dominant_eigenpair(matrix: &Array2<f64>) -> (f64, Array1<f64>, usize, bool) {
    let p = matrix.nrows();
    let uniform = Array1::<f64>::from_elem(p, 1.0 / (p as f64).sqrt());

    if let Some(result) = power_iterate(matrix, uniform.clone()) {
        return result;
    }
    for axis in 0..p {
        let mut basis = Array1::<f64>::zeros(p);
        basis[axis] = 1.0;
        if let Some(result) = power_iterate(matrix, basis) {
            return result;
        }
    }
    // Numerically zero matrix: nothing left to extract. A zero axis keeps
    // the exhausted component inert in projections and reconstructions.
    (0.0, Array1::zeros(p), 0, true)
}

/// One power-iteration run from `v`. Returns `None` when the seed lies in
/// the null space of `matrix` (so a different seed should be tried).
fn power_iterate(
    matrix: &Array2<f64>,
    mut v: Array1<f64>,
) -> Option<(f64, Array1<f64>, usize, bool)> {
    let mut iterations = 0;
    let mut converged = false;
    while iterations < MAX_POWER_ITERATIONS {
        iterations += 1;
        let w = matrix.dot(&v);
        let norm = w.dot(&w).sqrt();
        if norm < NULL_SPACE_FLOOR {
            return None;
        }
        let next = w / norm;
        let diff = (&next - &v).mapv(|d| d * d).sum().sqrt();
        v = next;
        if diff < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }
    }

    let eigenvalue = v.dot(&matrix.dot(&v)).max(0.0);
    Some((eigenvalue, v, iterations, converged))
}
