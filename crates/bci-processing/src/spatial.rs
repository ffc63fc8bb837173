//! Spatial filters applied across channels before spectral estimation
//!
//! Both filters are expressed as a channels-by-channels matrix that
//! pre-multiplies the epoch (channels on rows, samples on columns).

use bci_core::{DenseMatrix, EigOrder, PipelineResult};
use serde::{Deserialize, Serialize};

/// Relative eigenvalue cutoff below which a whitening component is dropped
pub const DEFAULT_WHITEN_THRESHOLD: f64 = 1e-15;

/// Spatial filter selection for a classifier configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialFilterKind {
    /// Pass the epoch through unchanged
    None,
    /// Common average reference: subtract the cross-channel mean
    Car,
    /// Equalize channel variance via the covariance eigendecomposition
    Whiten,
}

impl SpatialFilterKind {
    /// Apply this filter to an epoch with channels on rows
    pub fn apply(self, data: &DenseMatrix, threshold: f64) -> PipelineResult<DenseMatrix> {
        match self {
            SpatialFilterKind::None => Ok(data.clone()),
            SpatialFilterKind::Car => car_matrix(data.rows()).matmul(data),
            SpatialFilterKind::Whiten => whitening_matrix(data, threshold)?.matmul(data),
        }
    }
}

/// Common-average-reference matrix `I - J/size` for `size` channels
pub fn car_matrix(size: usize) -> DenseMatrix {
    let subtraction = 1.0 / size as f64;
    DenseMatrix::identity(size).map(|_, _, v| v - subtraction)
}

/// Whitening matrix `V * D * V^T` where `D` holds the inverse square
/// roots of the covariance eigenvalues. Eigenvalues at or below
/// `max(lambda) * threshold` map to zero, dropping the component.
pub fn whitening_matrix(data: &DenseMatrix, threshold: f64) -> PipelineResult<DenseMatrix> {
    let covariance = data.covariance()?;
    let eigen = covariance.eig(EigOrder::Ascending)?;

    let largest = eigen
        .values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let cutoff = largest * threshold;

    let dim = eigen.values.len();
    let mut diagonal = DenseMatrix::zeros(dim, dim);
    for (i, &value) in eigen.values.iter().enumerate() {
        if value > cutoff {
            diagonal.set(i, i, 1.0 / value.sqrt());
        }
    }

    eigen
        .vectors
        .matmul(&diagonal)?
        .matmul(&eigen.vectors.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bci_core::Axis;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {} within {} of {}",
            actual,
            tolerance,
            expected
        );
    }

    #[test]
    fn test_car_reference_values() {
        let data = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![5.0, 4.0]]).unwrap();
        let filtered = SpatialFilterKind::Car
            .apply(&data, DEFAULT_WHITEN_THRESHOLD)
            .unwrap();
        let expected =
            DenseMatrix::from_rows(&[vec![-2.0, -1.0], vec![2.0, 1.0]]).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                assert_close(filtered.get(r, c), expected.get(r, c), 1e-12);
            }
        }
    }

    #[test]
    fn test_car_rows_sum_to_zero() {
        let data = DenseMatrix::from_rows(&[
            vec![1.0, 7.0, 3.0],
            vec![2.0, 0.0, 5.0],
            vec![9.0, 1.0, 4.0],
        ])
        .unwrap();
        let filtered = SpatialFilterKind::Car
            .apply(&data, DEFAULT_WHITEN_THRESHOLD)
            .unwrap();
        let column_sums = filtered.sum(Axis::Rows).unwrap();
        for c in 0..3 {
            assert_close(column_sums.get(c, 0), 0.0, 1e-12);
        }
    }

    #[test]
    fn test_whitened_covariance_is_identity() {
        // correlated two-channel data with full-rank covariance
        let data = DenseMatrix::from_rows(&[
            vec![1.0, 2.0, 4.0, 3.0, 0.0, 5.0],
            vec![2.0, 1.0, 5.0, 2.0, 1.0, 3.0],
        ])
        .unwrap();
        let whitened = SpatialFilterKind::Whiten
            .apply(&data, DEFAULT_WHITEN_THRESHOLD)
            .unwrap();
        let covariance = whitened.covariance().unwrap();
        for r in 0..2 {
            for c in 0..2 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert_close(covariance.get(r, c), expected, 1e-9);
            }
        }
    }

    #[test]
    fn test_whitening_drops_rank_deficient_components() {
        // second channel is a copy of the first, covariance has rank one
        let data = DenseMatrix::from_rows(&[
            vec![1.0, 2.0, 4.0, 3.0],
            vec![1.0, 2.0, 4.0, 3.0],
        ])
        .unwrap();
        let transform = whitening_matrix(&data, DEFAULT_WHITEN_THRESHOLD).unwrap();
        // the transform stays finite despite the zero eigenvalue
        for r in 0..2 {
            for c in 0..2 {
                assert!(transform.get(r, c).is_finite());
            }
        }
    }

    #[test]
    fn test_none_is_identity() {
        let data = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![5.0, 4.0]]).unwrap();
        let filtered = SpatialFilterKind::None
            .apply(&data, DEFAULT_WHITEN_THRESHOLD)
            .unwrap();
        assert_eq!(filtered, data);
    }
}
