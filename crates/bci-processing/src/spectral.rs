//! FFT power spectra and Welch averaged-periodogram estimation
//!
//! The real-valued convenience path returns squared magnitudes; the complex
//! path returns raw coefficients. Welch windows must be a power of two and
//! match the taper length; non-conforming widths are rejected, not padded.

use bci_core::config_error;
use bci_core::{Axis, DenseMatrix, DetrendMode, PipelineResult};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

/// Transform direction for the FFT paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformDirection {
    Forward,
    Inverse,
}

/// Output kind of the Welch estimator. Only `Amplitude` is implemented;
/// requesting any other kind is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WelchOutput {
    Amplitude,
    Power,
    Decibel,
}

/// Optional per-window preprocessing for the Welch estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchOptions {
    /// Linearly detrend each window before tapering
    pub detrend: bool,
    /// Subtract each window's axis mean before tapering
    pub center: bool,
    /// Requested output kind
    pub output: WelchOutput,
}

impl Default for WelchOptions {
    fn default() -> Self {
        WelchOptions {
            detrend: false,
            center: false,
            output: WelchOutput::Amplitude,
        }
    }
}

/// Per-axis spectral estimator with a cached FFT planner
pub struct SpectralEstimator {
    planner: FftPlanner<f64>,
}

impl SpectralEstimator {
    pub fn new() -> Self {
        SpectralEstimator {
            planner: FftPlanner::new(),
        }
    }

    /// Squared-magnitude DFT along an axis. Axis `Rows` transforms each
    /// column, axis `Cols` each row. Forward is unscaled, inverse carries
    /// the 1/N normalization.
    pub fn fft_power(
        &mut self,
        matrix: &DenseMatrix,
        axis: Axis,
        direction: TransformDirection,
    ) -> PipelineResult<DenseMatrix> {
        let axis = axis.directional("fft")?;
        match axis {
            Axis::Rows => {
                let mut out = DenseMatrix::zeros(matrix.rows(), matrix.cols());
                for c in 0..matrix.cols() {
                    let spectrum = self.transform_lane(&matrix.column(c), direction);
                    for (i, value) in spectrum.iter().enumerate() {
                        out.set(i, c, value.norm_sqr());
                    }
                }
                Ok(out)
            }
            Axis::Cols => Ok(self
                .fft_power(&matrix.transpose(), Axis::Rows, direction)?
                .transpose()),
            Axis::All => unreachable!(),
        }
    }

    /// Raw complex DFT coefficients along an axis, indexed `[row][col]`
    pub fn fft_complex(
        &mut self,
        matrix: &DenseMatrix,
        axis: Axis,
        direction: TransformDirection,
    ) -> PipelineResult<Vec<Vec<Complex<f64>>>> {
        let axis = axis.directional("fft")?;
        let mut out = vec![vec![Complex::new(0.0, 0.0); matrix.cols()]; matrix.rows()];
        match axis {
            Axis::Rows => {
                for c in 0..matrix.cols() {
                    let spectrum = self.transform_lane(&matrix.column(c), direction);
                    for (i, value) in spectrum.into_iter().enumerate() {
                        out[i][c] = value;
                    }
                }
            }
            Axis::Cols => {
                for r in 0..matrix.rows() {
                    let spectrum = self.transform_lane(matrix.row(r), direction);
                    out[r] = spectrum;
                }
            }
            Axis::All => unreachable!(),
        }
        Ok(out)
    }

    fn transform_lane(&mut self, values: &[f64], direction: TransformDirection) -> Vec<Complex<f64>> {
        let mut buffer: Vec<Complex<f64>> =
            values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        if buffer.is_empty() {
            return buffer;
        }
        let fft = match direction {
            TransformDirection::Forward => self.planner.plan_fft_forward(buffer.len()),
            TransformDirection::Inverse => self.planner.plan_fft_inverse(buffer.len()),
        };
        fft.process(&mut buffer);
        if direction == TransformDirection::Inverse {
            let scale = 1.0 / buffer.len() as f64;
            for value in &mut buffer {
                *value *= scale;
            }
        }
        buffer
    }

    /// Welch averaged-periodogram estimate along an axis.
    ///
    /// For every start offset: slice a `width`-long window, optionally
    /// center and detrend it, taper, take the power spectrum scaled by 2,
    /// keep the non-negative frequency bins and accumulate the amplitude
    /// (square root of power). The result is normalized by the window
    /// count and the taper sum, and is elementwise non-negative.
    pub fn welch(
        &mut self,
        matrix: &DenseMatrix,
        axis: Axis,
        taper: &[f64],
        starts: &[usize],
        width: usize,
        options: WelchOptions,
    ) -> PipelineResult<DenseMatrix> {
        let axis = axis.directional("welch")?;
        if width == 0 || !width.is_power_of_two() {
            return Err(config_error!(
                "welch width must be a power of two, got {}",
                width
            ));
        }
        if taper.len() != width {
            return Err(config_error!(
                "taper length {} does not match welch width {}",
                taper.len(),
                width
            ));
        }
        if starts.is_empty() {
            return Err(config_error!("welch requires at least one start offset"));
        }
        if options.output != WelchOutput::Amplitude {
            return Err(config_error!(
                "welch output kind {:?} is not supported, only Amplitude",
                options.output
            ));
        }
        let lane_length = matrix.dimension(axis);
        for &start in starts {
            if start + width > lane_length {
                return Err(config_error!(
                    "welch window at {} of width {} exceeds axis length {}",
                    start,
                    width,
                    lane_length
                ));
            }
        }

        let reduced = (width - 1).div_ceil(2) + 1;
        let mut accumulated = match axis {
            Axis::Rows => DenseMatrix::zeros(reduced, matrix.cols()),
            Axis::Cols => DenseMatrix::zeros(matrix.rows(), reduced),
            Axis::All => unreachable!(),
        };

        for &start in starts {
            let mut window = match axis {
                Axis::Rows => matrix.sub_matrix(start..start + width, 0..matrix.cols())?,
                Axis::Cols => matrix.sub_matrix(0..matrix.rows(), start..start + width)?,
                Axis::All => unreachable!(),
            };
            if options.center {
                window = window.detrend(axis, DetrendMode::Constant)?;
            }
            if options.detrend {
                window = window.detrend(axis, DetrendMode::Linear)?;
            }
            window = match axis {
                Axis::Rows => window.map(|r, _, v| v * taper[r]),
                Axis::Cols => window.map(|_, c, v| v * taper[c]),
                Axis::All => unreachable!(),
            };

            let power = self
                .fft_power(&window, axis, TransformDirection::Forward)?
                .scale(2.0);
            let kept = match axis {
                Axis::Rows => power.sub_matrix(0..reduced, 0..power.cols())?,
                Axis::Cols => power.sub_matrix(0..power.rows(), 0..reduced)?,
                Axis::All => unreachable!(),
            };
            accumulated = accumulated.add(&kept.sqrt_elements())?;
        }

        let taper_sum: f64 = taper.iter().sum();
        Ok(accumulated.scale(1.0 / (starts.len() as f64 * taper_sum)))
    }
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        SpectralEstimator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taper::Taper;

    fn matrix_a() -> DenseMatrix {
        DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![5.0, 4.0]]).unwrap()
    }

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
    fn test_fft_power_per_column() {
        let mut estimator = SpectralEstimator::new();
        let power = estimator
            .fft_power(&matrix_a(), Axis::Rows, TransformDirection::Forward)
            .unwrap();
        // columns [1,5] and [2,4]: DC power (sum)^2, Nyquist (diff)^2
        assert_close(power.get(0, 0), 36.0, 1e-9);
        assert_close(power.get(0, 1), 36.0, 1e-9);
        assert_close(power.get(1, 0), 16.0, 1e-9);
        assert_close(power.get(1, 1), 4.0, 1e-9);
    }

    #[test]
    fn test_fft_power_per_row() {
        let mut estimator = SpectralEstimator::new();
        let power = estimator
            .fft_power(&matrix_a(), Axis::Cols, TransformDirection::Forward)
            .unwrap();
        assert_close(power.get(0, 0), 9.0, 1e-9);
        assert_close(power.get(0, 1), 1.0, 1e-9);
        assert_close(power.get(1, 0), 81.0, 1e-9);
        assert_close(power.get(1, 1), 1.0, 1e-9);
    }

    #[test]
    fn test_inverse_fft_is_normalized() {
        let mut estimator = SpectralEstimator::new();
        let power = estimator
            .fft_power(&matrix_a(), Axis::Rows, TransformDirection::Inverse)
            .unwrap();
        // column [1,5]: inverse coefficients (3, -2)
        assert_close(power.get(0, 0), 9.0, 1e-9);
        assert_close(power.get(1, 0), 4.0, 1e-9);
    }

    #[test]
    fn test_fft_complex_has_conjugate_symmetry() {
        let mut estimator = SpectralEstimator::new();
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        let spectrum = estimator
            .fft_complex(&m, Axis::Cols, TransformDirection::Forward)
            .unwrap();
        // DC term is the plain sum for a real input
        assert_close(spectrum[0][0].re, 10.0, 1e-9);
        assert_close(spectrum[0][0].im, 0.0, 1e-9);
        // real input: bin k is the conjugate of bin N-k
        assert_close(spectrum[0][1].re, spectrum[0][3].re, 1e-9);
        assert_close(spectrum[0][1].im, -spectrum[0][3].im, 1e-9);
    }

    #[test]
    fn test_fft_rejects_all_axis() {
        let mut estimator = SpectralEstimator::new();
        assert!(estimator
            .fft_power(&matrix_a(), Axis::All, TransformDirection::Forward)
            .is_err());
    }

    #[test]
    fn test_welch_configuration_errors() {
        let mut estimator = SpectralEstimator::new();
        let signal = DenseMatrix::zeros(64, 2);
        let taper = Taper::Hanning.generate(16);

        // non-power-of-two width
        assert!(estimator
            .welch(&signal, Axis::Rows, &Taper::Hanning.generate(12), &[0], 12,
                   WelchOptions::default())
            .is_err());
        // taper/width mismatch
        assert!(estimator
            .welch(&signal, Axis::Rows, &taper, &[0], 32, WelchOptions::default())
            .is_err());
        // empty starts
        assert!(estimator
            .welch(&signal, Axis::Rows, &taper, &[], 16, WelchOptions::default())
            .is_err());
        // unsupported output kind
        let power_out = WelchOptions {
            output: WelchOutput::Power,
            ..WelchOptions::default()
        };
        assert!(estimator
            .welch(&signal, Axis::Rows, &taper, &[0], 16, power_out)
            .is_err());
        // window past the end
        assert!(estimator
            .welch(&signal, Axis::Rows, &taper, &[60], 16, WelchOptions::default())
            .is_err());
    }

    #[test]
    fn test_welch_non_negative_and_peaked() {
        let mut estimator = SpectralEstimator::new();
        let width = 32;
        // 64 samples of a sinusoid hitting bin 4 of a 32-wide window
        let samples: Vec<f64> = (0..64)
            .map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / width as f64).sin())
            .collect();
        let signal = DenseMatrix::new(64, 1, samples).unwrap();
        let taper = Taper::Hanning.generate(width);

        let spectrum = estimator
            .welch(
                &signal,
                Axis::Rows,
                &taper,
                &[0, 16, 32],
                width,
                WelchOptions::default(),
            )
            .unwrap();
        assert_eq!(spectrum.shape(), (width / 2 + 1, 1));

        let mut peak_bin = 0;
        for i in 0..spectrum.rows() {
            assert!(spectrum.get(i, 0) >= 0.0, "bin {} negative", i);
            if spectrum.get(i, 0) > spectrum.get(peak_bin, 0) {
                peak_bin = i;
            }
        }
        assert_eq!(peak_bin, 4);
    }

    #[test]
    fn test_welch_center_removes_dc() {
        let mut estimator = SpectralEstimator::new();
        let width = 16;
        // constant signal: centering empties the spectrum
        let signal = DenseMatrix::ones(32, 1).scale(5.0);
        let taper = Taper::Rectangular.generate(width);
        let options = WelchOptions {
            center: true,
            ..WelchOptions::default()
        };
        let spectrum = estimator
            .welch(&signal, Axis::Rows, &taper, &[0, 8], width, options)
            .unwrap();
        assert_close(spectrum.sum(Axis::All).unwrap().get(0, 0), 0.0, 1e-9);
    }

    #[test]
    fn test_welch_along_columns() {
        let mut estimator = SpectralEstimator::new();
        let width = 16;
        let signal = DenseMatrix::from_rows(&[
            (0..32).map(|i| (i as f64 * 0.3).sin()).collect(),
            (0..32).map(|i| (i as f64 * 0.7).cos()).collect(),
        ])
        .unwrap();
        let taper = Taper::Hanning.generate(width);
        let spectrum = estimator
            .welch(&signal, Axis::Cols, &taper, &[0, 8, 16], width,
                   WelchOptions::default())
            .unwrap();
        // channels stay on rows, frequencies across columns
        assert_eq!(spectrum.shape(), (2, width / 2 + 1));
    }
}
