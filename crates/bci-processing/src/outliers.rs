//! Iterative outlier rejection for epochs and channel sets
//!
//! Rows or columns are dropped when their summary feature falls outside a
//! median-plus-scaled-std band. The band std is bias-corrected (N-1) even
//! though the variance feature itself uses the population denominator;
//! this asymmetry is intentional.

use bci_core::config_error;
use bci_core::{Axis, DenseMatrix, PipelineResult};
use serde::{Deserialize, Serialize};

/// Summary feature used to score each row or column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierFeature {
    /// `sqrt(|variance|)` per lane
    Variance,
    /// Plain mean per lane; kept for completeness, weakly validated
    Mean,
}

/// Iteratively trim outliers along an axis.
///
/// Runs `max_iter` passes. Each pass scores every lane perpendicular to
/// `axis` (axis `Rows` scores and trims columns, axis `Cols` rows), then
/// keeps only lanes whose score lies strictly within
/// `(median + lower * std, median + upper * std)` of the scores. Passes
/// operate on the already-shrunk matrix. Returns `None` when a pass
/// leaves no survivors; callers choose their own fallback.
pub fn remove_outliers(
    matrix: &DenseMatrix,
    axis: Axis,
    lower: f64,
    upper: f64,
    max_iter: usize,
    feature: OutlierFeature,
) -> PipelineResult<Option<DenseMatrix>> {
    let axis = axis.directional("outlier removal")?;
    if max_iter == 0 {
        return Err(config_error!(
            "outlier removal requires at least one iteration"
        ));
    }

    let mut current = matrix.clone();
    for _ in 0..max_iter {
        match trim_once(&current, axis, lower, upper, feature)? {
            Some(trimmed) => current = trimmed,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn trim_once(
    matrix: &DenseMatrix,
    axis: Axis,
    lower: f64,
    upper: f64,
    feature: OutlierFeature,
) -> PipelineResult<Option<DenseMatrix>> {
    let scores = match feature {
        OutlierFeature::Variance => matrix.variance(axis)?.abs().sqrt_elements(),
        OutlierFeature::Mean => matrix.mean(axis)?,
    };
    let scores = scores.column(0);

    let median = DenseMatrix::from_column(&scores)
        .median(Axis::All)?
        .get(0, 0);
    let std = sample_std(&scores);
    let low = median + lower * std;
    let high = median + upper * std;

    let keep: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, &s)| low < s && s < high)
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return Ok(None);
    }

    let trimmed = match axis {
        Axis::Rows => {
            let mut out = DenseMatrix::zeros(matrix.rows(), keep.len());
            for (target, &source) in keep.iter().enumerate() {
                for r in 0..matrix.rows() {
                    out.set(r, target, matrix.get(r, source));
                }
            }
            out
        }
        Axis::Cols => {
            let mut out = DenseMatrix::zeros(keep.len(), matrix.cols());
            for (target, &source) in keep.iter().enumerate() {
                for c in 0..matrix.cols() {
                    out.set(target, c, matrix.get(source, c));
                }
            }
            out
        }
        Axis::All => unreachable!(),
    };
    Ok(Some(trimmed))
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let squared: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (squared / (n - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_b() -> DenseMatrix {
        DenseMatrix::from_rows(&[
            vec![0.5, 0.4, 0.2],
            vec![0.3, 0.2, 0.2],
            vec![0.2, 0.2, 0.7],
        ])
        .unwrap()
    }

    #[test]
    fn test_trims_high_variance_column() {
        let trimmed =
            remove_outliers(&matrix_b(), Axis::Rows, -1.0, 1.0, 3, OutlierFeature::Variance)
                .unwrap()
                .unwrap();
        assert_eq!(trimmed.shape(), (3, 2));
        // surviving columns keep their original contents and order
        assert_eq!(trimmed.column(0), vec![0.5, 0.3, 0.2]);
        assert_eq!(trimmed.column(1), vec![0.4, 0.2, 0.2]);
    }

    #[test]
    fn test_trims_high_variance_row() {
        let trimmed =
            remove_outliers(&matrix_b(), Axis::Cols, -1.0, 1.0, 3, OutlierFeature::Variance)
                .unwrap()
                .unwrap();
        assert_eq!(trimmed.shape(), (2, 3));
        assert_eq!(trimmed.row(0), &[0.5, 0.4, 0.2]);
        assert_eq!(trimmed.row(1), &[0.3, 0.2, 0.2]);
    }

    #[test]
    fn test_zero_band_removes_everything() {
        let result =
            remove_outliers(&matrix_b(), Axis::Rows, 0.0, 0.0, 1, OutlierFeature::Variance)
                .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_rejects_all_axis_and_zero_iterations() {
        assert!(
            remove_outliers(&matrix_b(), Axis::All, -1.0, 1.0, 1, OutlierFeature::Variance)
                .is_err()
        );
        assert!(
            remove_outliers(&matrix_b(), Axis::Rows, -1.0, 1.0, 0, OutlierFeature::Variance)
                .is_err()
        );
    }

    #[test]
    fn test_mean_feature_band() {
        // wide band keeps every column under the mean feature
        let kept =
            remove_outliers(&matrix_b(), Axis::Rows, -10.0, 10.0, 1, OutlierFeature::Mean)
                .unwrap()
                .unwrap();
        assert_eq!(kept, matrix_b());
    }
}
