// Feature analysis engine

#![doc = include_str!("../README.md")]

pub mod correlation;
pub mod distribution;
pub mod error;
pub mod expr;
pub mod normalize;
pub mod pca;
pub mod stats;

pub use correlation::{correlation_matrix, pearson, CorrelationMatrix};
pub use distribution::{histogram, kernel_density, HistogramBin, KdeCurve};
pub use error::{Error, Result};
pub use expr::{validate_expression, Bindings, CompiledExpression};
pub use normalize::{
    denormalize, normalize, normalize_vector, NormalizationSpec, NormalizationStrategy,
};
pub use pca::PcaModel;
pub use stats::{ColumnStats, DatasetStatistics, FeatureVector};
