//! DenseMatrix: axis-aware row-major matrix for epoch processing
//!
//! Every operation returns a new matrix except `round_in_place`. The axis
//! convention is fixed across the whole pipeline: `Rows` reduces over rows
//! (one value per column), `Cols` reduces over columns (one value per row),
//! `All` reduces every element to a 1x1 matrix. Reductions come back as
//! column vectors.

use crate::config_error;
use crate::error::PipelineResult;
use serde::{Deserialize, Serialize};
use std::ops::{Index, Range};

/// Reduction and transform direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Reduce over every element
    All,
    /// Reduce over rows, yielding one value per column
    Rows,
    /// Reduce over columns, yielding one value per row
    Cols,
}

impl Axis {
    /// Parse the conventional integer encoding (-1, 0, 1)
    pub fn from_i32(axis: i32) -> PipelineResult<Self> {
        match axis {
            -1 => Ok(Axis::All),
            0 => Ok(Axis::Rows),
            1 => Ok(Axis::Cols),
            other => Err(config_error!(
                "axis must be -1, 0 or 1, got {}",
                other
            )),
        }
    }

    /// Reject the `All` axis for operations that need a direction
    pub fn directional(self, operation: &str) -> PipelineResult<Self> {
        match self {
            Axis::All => Err(config_error!(
                "{} requires axis 0 (rows) or 1 (columns)",
                operation
            )),
            axis => Ok(axis),
        }
    }
}

/// Detrending mode for `DenseMatrix::detrend`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetrendMode {
    /// Subtract the axis mean
    Constant,
    /// Subtract an ordinary-least-squares line fitted against index 0..n-1
    Linear,
}

/// Rectangular grid of real numbers, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Create a matrix from a row-major buffer
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> PipelineResult<Self> {
        if data.len() != rows * cols {
            return Err(config_error!(
                "buffer of {} elements does not fill a {}x{} matrix",
                data.len(),
                rows,
                cols
            ));
        }
        Ok(DenseMatrix { rows, cols, data })
    }

    /// Create a matrix from rows of equal length
    pub fn from_rows(rows: &[Vec<f64>]) -> PipelineResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(config_error!(
                    "row {} has {} elements, expected {}",
                    i,
                    row.len(),
                    n_cols
                ));
            }
        }
        let data = rows.iter().flatten().copied().collect();
        DenseMatrix::new(n_rows, n_cols, data)
    }

    /// Column vector from a slice
    pub fn from_column(values: &[f64]) -> Self {
        DenseMatrix {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        DenseMatrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// All-one matrix
    pub fn ones(rows: usize, cols: usize) -> Self {
        DenseMatrix {
            rows,
            cols,
            data: vec![1.0; rows * cols],
        }
    }

    /// Square identity matrix
    pub fn identity(dim: usize) -> Self {
        let mut m = DenseMatrix::zeros(dim, dim);
        for i in 0..dim {
            m.data[i * dim + i] = 1.0;
        }
        m
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total element count
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the matrix holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size along one direction; `All` yields the element count
    pub fn dimension(&self, axis: Axis) -> usize {
        match axis {
            Axis::All => self.len(),
            Axis::Rows => self.rows,
            Axis::Cols => self.cols,
        }
    }

    /// Single element
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Overwrite a single element
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copy one column
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Borrow the row-major buffer
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Copy a rectangular region
    pub fn sub_matrix(&self, rows: Range<usize>, cols: Range<usize>) -> PipelineResult<Self> {
        if rows.end > self.rows || cols.end > self.cols {
            return Err(config_error!(
                "sub-matrix {}..{} x {}..{} exceeds shape {}x{}",
                rows.start,
                rows.end,
                cols.start,
                cols.end,
                self.rows,
                self.cols
            ));
        }
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for r in rows.clone() {
            data.extend_from_slice(&self.row(r)[cols.clone()]);
        }
        DenseMatrix::new(rows.len(), cols.len(), data)
    }

    /// Pure elementwise transform `(row, col, value) -> value`
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(usize, usize, f64) -> f64,
    {
        let mut out = self.clone();
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[r * self.cols + c] = f(r, c, self.get(r, c));
            }
        }
        out
    }

    /// Multiply every element by a scalar
    pub fn scale(&self, factor: f64) -> Self {
        self.map(|_, _, v| v * factor)
    }

    /// Add a scalar to every element
    pub fn offset(&self, amount: f64) -> Self {
        self.map(|_, _, v| v + amount)
    }

    /// Elementwise absolute value
    pub fn abs(&self) -> Self {
        self.map(|_, _, v| v.abs())
    }

    /// Elementwise square root
    pub fn sqrt_elements(&self) -> Self {
        self.map(|_, _, v| v.sqrt())
    }

    /// Round every element to a number of decimals, in place.
    /// The one documented in-place mutation.
    pub fn round_in_place(&mut self, decimals: u32) {
        let factor = 10f64.powi(decimals as i32);
        for v in &mut self.data {
            *v = (*v * factor).round() / factor;
        }
    }

    /// Transposed copy; `m.transpose().transpose() == m`
    pub fn transpose(&self) -> Self {
        let mut out = DenseMatrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.get(r, c);
            }
        }
        out
    }

    /// Reinterpret the row-major buffer with new dimensions
    pub fn reshape(&self, rows: usize, cols: usize) -> PipelineResult<Self> {
        if rows * cols != self.len() {
            return Err(config_error!(
                "cannot reshape {} elements into {}x{}",
                self.len(),
                rows,
                cols
            ));
        }
        DenseMatrix::new(rows, cols, self.data.clone())
    }

    /// Flatten into a single column, row-major order
    pub fn flatten(&self) -> Self {
        DenseMatrix {
            rows: self.len(),
            cols: 1,
            data: self.data.clone(),
        }
    }

    /// Reverse the row order
    pub fn flip_ud(&self) -> Self {
        let mut data = Vec::with_capacity(self.len());
        for r in (0..self.rows).rev() {
            data.extend_from_slice(self.row(r));
        }
        DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Reverse the element order within each row
    pub fn flip_lr(&self) -> Self {
        self.map(|r, c, _| self.get(r, self.cols - c - 1))
    }

    /// Stack whole copies of the matrix along an axis
    pub fn repeat(&self, repeats: usize, axis: Axis) -> PipelineResult<Self> {
        let axis = axis.directional("repeat")?;
        if repeats == 0 {
            return Err(config_error!("repeat count must be at least 1"));
        }
        match axis {
            Axis::Rows => {
                let mut data = Vec::with_capacity(self.len() * repeats);
                for _ in 0..repeats {
                    data.extend_from_slice(&self.data);
                }
                DenseMatrix::new(self.rows * repeats, self.cols, data)
            }
            Axis::Cols => Ok(self.transpose().repeat(repeats, Axis::Rows)?.transpose()),
            Axis::All => unreachable!(),
        }
    }

    /// Elementwise sum; shapes must match
    pub fn add(&self, other: &DenseMatrix) -> PipelineResult<Self> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Elementwise difference; shapes must match
    pub fn subtract(&self, other: &DenseMatrix) -> PipelineResult<Self> {
        self.zip_with(other, "subtract", |a, b| a - b)
    }

    /// Elementwise product; shapes must match
    pub fn multiply_elements(&self, other: &DenseMatrix) -> PipelineResult<Self> {
        self.zip_with(other, "multiply_elements", |a, b| a * b)
    }

    /// Elementwise quotient; shapes must match
    pub fn divide_elements(&self, other: &DenseMatrix) -> PipelineResult<Self> {
        self.zip_with(other, "divide_elements", |a, b| a / b)
    }

    fn zip_with<F>(&self, other: &DenseMatrix, op: &str, f: F) -> PipelineResult<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.shape() != other.shape() {
            return Err(config_error!(
                "{} requires equal shapes, got {}x{} and {}x{}",
                op,
                self.rows,
                self.cols,
                other.rows,
                other.cols
            ));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        DenseMatrix::new(self.rows, self.cols, data)
    }

    /// Matrix product `self * other`
    pub fn matmul(&self, other: &DenseMatrix) -> PipelineResult<Self> {
        if self.cols != other.rows {
            return Err(config_error!(
                "cannot multiply {}x{} by {}x{}",
                self.rows,
                self.cols,
                other.rows,
                other.cols
            ));
        }
        let mut out = DenseMatrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.data[r * other.cols + c] += a * other.get(k, c);
                }
            }
        }
        Ok(out)
    }

    /// Apply an arbitrary per-vector statistic along an axis.
    /// Reductions come back as column vectors; `All` yields 1x1.
    pub fn reduce_with<F>(&self, axis: Axis, stat: F) -> PipelineResult<Self>
    where
        F: Fn(&[f64]) -> f64,
    {
        match axis {
            Axis::All => Ok(DenseMatrix::from_column(&[stat(&self.data)])),
            Axis::Rows => {
                let values: Vec<f64> = (0..self.cols).map(|c| stat(&self.column(c))).collect();
                Ok(DenseMatrix::from_column(&values))
            }
            Axis::Cols => {
                let values: Vec<f64> = (0..self.rows).map(|r| stat(self.row(r))).collect();
                Ok(DenseMatrix::from_column(&values))
            }
        }
    }

    /// Sum along an axis
    pub fn sum(&self, axis: Axis) -> PipelineResult<Self> {
        self.reduce_with(axis, |v| v.iter().sum())
    }

    /// Mean along an axis
    pub fn mean(&self, axis: Axis) -> PipelineResult<Self> {
        self.reduce_with(axis, vec_mean)
    }

    /// Median along an axis
    pub fn median(&self, axis: Axis) -> PipelineResult<Self> {
        self.reduce_with(axis, vec_median)
    }

    /// Population variance (denominator N) along an axis
    pub fn variance(&self, axis: Axis) -> PipelineResult<Self> {
        self.reduce_with(axis, vec_population_variance)
    }

    /// Population standard deviation (denominator N) along an axis
    pub fn std(&self, axis: Axis) -> PipelineResult<Self> {
        self.reduce_with(axis, |v| vec_population_variance(v).sqrt())
    }

    /// Remove a constant or linear trend along an axis
    pub fn detrend(&self, axis: Axis, mode: DetrendMode) -> PipelineResult<Self> {
        let axis = axis.directional("detrend")?;
        match mode {
            DetrendMode::Constant => {
                let means = self.mean(axis)?;
                Ok(match axis {
                    Axis::Rows => self.map(|_, c, v| v - means.get(c, 0)),
                    Axis::Cols => self.map(|r, _, v| v - means.get(r, 0)),
                    Axis::All => unreachable!(),
                })
            }
            DetrendMode::Linear => {
                let mut out = self.clone();
                match axis {
                    Axis::Rows => {
                        for c in 0..self.cols {
                            let (intercept, slope) = fit_line(&self.column(c));
                            for r in 0..self.rows {
                                let fitted = intercept + slope * r as f64;
                                out.data[r * self.cols + c] -= fitted;
                            }
                        }
                    }
                    Axis::Cols => {
                        for r in 0..self.rows {
                            let (intercept, slope) = fit_line(self.row(r));
                            for c in 0..self.cols {
                                let fitted = intercept + slope * c as f64;
                                out.data[r * self.cols + c] -= fitted;
                            }
                        }
                    }
                    Axis::All => unreachable!(),
                }
                Ok(out)
            }
        }
    }

    /// Full linear convolution with a kernel, per row (axis 0) or per
    /// column (axis 1). Output length is n + kernel.len() - 1.
    pub fn convolve(&self, kernel: &[f64], axis: Axis) -> PipelineResult<Self> {
        let axis = axis.directional("convolve")?;
        if kernel.is_empty() {
            return Err(config_error!("convolution kernel must not be empty"));
        }
        match axis {
            Axis::Rows => {
                let out_len = self.cols + kernel.len() - 1;
                let mut out = DenseMatrix::zeros(self.rows, out_len);
                for r in 0..self.rows {
                    for (i, &x) in self.row(r).iter().enumerate() {
                        for (j, &k) in kernel.iter().enumerate() {
                            out.data[r * out_len + i + j] += x * k;
                        }
                    }
                }
                Ok(out)
            }
            Axis::Cols => Ok(self.transpose().convolve(kernel, Axis::Rows)?.transpose()),
            Axis::All => unreachable!(),
        }
    }

    /// Covariance of the rows (rows as variables, columns as observations),
    /// population denominator.
    pub fn covariance(&self) -> PipelineResult<Self> {
        if self.cols == 0 {
            return Err(config_error!("covariance requires at least one observation"));
        }
        let centered = self.detrend(Axis::Cols, DetrendMode::Constant)?;
        let n = self.cols as f64;
        centered.matmul(&centered.transpose()).map(|m| m.scale(1.0 / n))
    }
}

impl Index<(usize, usize)> for DenseMatrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[row * self.cols + col]
    }
}

fn vec_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn vec_population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mean = vec_mean(values);
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

fn vec_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Ordinary least squares of value against index 0..n-1
fn fit_line(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (values.first().copied().unwrap_or(0.0), 0.0);
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = vec_mean(values);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    (y_mean - slope * x_mean, slope)
}
