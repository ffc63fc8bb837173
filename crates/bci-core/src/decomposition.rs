//! Eigendecomposition and SVD for DenseMatrix
//!
//! The only place the pipeline touches a general linear-algebra library;
//! everything else operates on the row-major buffer directly.

use crate::config_error;
use crate::error::PipelineResult;
use crate::matrix::DenseMatrix;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Eigenvalue ordering for `DenseMatrix::eig`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EigOrder {
    Ascending,
    Descending,
}

/// Result of a symmetric eigendecomposition. Eigenvectors are the matrix
/// columns, matched to `values` by position. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenResult {
    pub vectors: DenseMatrix,
    pub values: Vec<f64>,
}

/// Result of a singular value decomposition: `u * sigma * v_t`
/// reconstructs the input. Sigma is a square diagonal matrix of the
/// singular values in the library's order.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdResult {
    pub u: DenseMatrix,
    pub sigma: DenseMatrix,
    pub v_t: DenseMatrix,
}

impl DenseMatrix {
    fn to_nalgebra(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows(), self.cols(), self.data())
    }

    fn from_nalgebra(m: &DMatrix<f64>) -> DenseMatrix {
        let (rows, cols) = m.shape();
        let mut out = DenseMatrix::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                out.set(r, c, m[(r, c)]);
            }
        }
        out
    }

    /// Symmetric eigendecomposition with configurable value ordering.
    /// Ties keep their original index order.
    pub fn eig(&self, order: EigOrder) -> PipelineResult<EigenResult> {
        if self.rows() != self.cols() {
            return Err(config_error!(
                "eigendecomposition requires a square matrix, got {}x{}",
                self.rows(),
                self.cols()
            ));
        }
        let eigen = self.to_nalgebra().symmetric_eigen();
        let raw_values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();

        let mut permutation: Vec<usize> = (0..raw_values.len()).collect();
        match order {
            EigOrder::Ascending => permutation.sort_by(|&i, &j| {
                raw_values[i]
                    .partial_cmp(&raw_values[j])
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            EigOrder::Descending => permutation.sort_by(|&i, &j| {
                raw_values[j]
                    .partial_cmp(&raw_values[i])
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        let dim = raw_values.len();
        let mut vectors = DenseMatrix::zeros(dim, dim);
        let mut values = Vec::with_capacity(dim);
        for (target, &source) in permutation.iter().enumerate() {
            values.push(raw_values[source]);
            for r in 0..dim {
                vectors.set(r, target, eigen.eigenvectors[(r, source)]);
            }
        }
        Ok(EigenResult { vectors, values })
    }

    /// Singular value decomposition. No sign or ordering normalization
    /// beyond what the library produces.
    pub fn svd(&self) -> PipelineResult<SvdResult> {
        let svd = self.to_nalgebra().svd(true, true);
        let u = svd
            .u
            .as_ref()
            .ok_or_else(|| config_error!("SVD did not produce U"))?;
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| config_error!("SVD did not produce V^T"))?;

        let k = svd.singular_values.len();
        let mut sigma = DenseMatrix::zeros(k, k);
        for i in 0..k {
            sigma.set(i, i, svd.singular_values[i]);
        }
        Ok(SvdResult {
            u: DenseMatrix::from_nalgebra(u),
            sigma,
            v_t: DenseMatrix::from_nalgebra(v_t),
        })
    }
}
