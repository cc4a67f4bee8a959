//! Per-column dataset statistics.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named, ordered sequence of sample values.
///
/// Every vector participating in one analysis must have the same length
/// (the sample count). The engine entry points validate this; the vectors
/// themselves are plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub name: String,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of samples in this vector.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Summary statistics of one raw column, computed once per dataset load and
/// immutable until the next reload.
///
/// `std` is the population standard deviation (divisor `n`), matching what
/// the PCA standardization step uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    /// Computes min/max/mean/std over a raw column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `values` is empty.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::invalid_input(
                "cannot compute column statistics of an empty column",
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

        let variance = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = variance.sqrt();

        Ok(Self {
            min,
            max,
            mean,
            std,
        })
    }

    /// Width of the observed value range.
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Statistics for every column of a sample-aligned feature set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStatistics {
    names: Vec<String>,
    columns: Vec<ColumnStats>,
}

impl DatasetStatistics {
    /// Computes per-column statistics for the whole dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `features` is empty, any vector is
    /// empty, or the vectors disagree on sample count.
    pub fn compute(features: &[FeatureVector]) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::invalid_input("no feature vectors supplied"));
        }
        let n_samples = features[0].len();
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

        let mut names = Vec::with_capacity(features.len());
        let mut columns = Vec::with_capacity(features.len());
        for feature in features {
            names.push(feature.name.clone());
            columns.push(ColumnStats::from_values(&feature.values)?);
        }

        Ok(Self { names, columns })
    }

    /// Statistics of a column by position.
    pub fn column(&self, index: usize) -> Option<&ColumnStats> {
        self.columns.get(index)
    }

    /// Statistics of a column by feature name.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnStats> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Ordered feature names, aligned with [`DatasetStatistics::column`].
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
