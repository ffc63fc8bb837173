//! Epoch-to-decision mapping: preprocessing, Welch features, linear model
//!
//! A `Classifier` owns one immutable configuration plus the cached FFT
//! planner, and maps one epoch (rows = samples, cols = channels) to a raw
//! linear output and a transformed confidence vector.

use crate::outliers::{remove_outliers, OutlierFeature};
use crate::spatial::{SpatialFilterKind, DEFAULT_WHITEN_THRESHOLD};
use crate::spectral::{SpectralEstimator, WelchOptions};
use crate::taper::Taper;
use bci_core::config_error;
use bci_core::{Axis, DenseMatrix, PipelineResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Mapping from the raw linear output to a class confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    /// Pass the linear output through unchanged
    #[default]
    Identity,
    /// Elementwise sigmoid
    Logistic,
    /// Normalized exponential across classes
    Softmax,
}

impl DecisionKind {
    fn transform(self, raw: &DenseMatrix) -> DenseMatrix {
        match self {
            DecisionKind::Identity => raw.clone(),
            DecisionKind::Logistic => raw.map(|_, _, v| 1.0 / (1.0 + (-v).exp())),
            DecisionKind::Softmax => {
                let peak = raw
                    .data()
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                let shifted = raw.map(|_, _, v| (v - peak).exp());
                let total: f64 = shifted.data().iter().sum();
                shifted.scale(1.0 / total)
            }
        }
    }
}

fn default_whiten_threshold() -> f64 {
    DEFAULT_WHITEN_THRESHOLD
}

fn default_downsample_factor() -> usize {
    1
}

/// Construction-time classifier parameters. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Linear weights, features on rows and classes on columns
    pub weights: DenseMatrix,
    /// Per-class bias, one entry per weight column
    pub bias: Vec<f64>,
    pub spatial_filter: SpatialFilterKind,
    #[serde(default = "default_whiten_threshold")]
    pub whiten_threshold: f64,
    /// Bad-channel rejection band scale; negative disables the pass
    pub bad_channel_threshold: f64,
    /// Bad-trial rejection band scale; negative disables the pass
    pub bad_trial_threshold: f64,
    pub taper: Taper,
    #[serde(default)]
    pub welch: WelchOptions,
    /// Indices into `start_ms` selecting which sub-windows become features
    pub time_idx: Vec<usize>,
    /// Frequency-bin indices kept from each sub-window spectrum
    pub freq_idx: Vec<usize>,
    /// Sub-window start offsets in milliseconds
    pub start_ms: Vec<f64>,
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: usize,
    /// Source sampling rate in Hz, before down-sampling
    pub sample_rate: f64,
    /// Welch window width in samples, power of two
    pub window_width: usize,
    #[serde(default)]
    pub decision: DecisionKind,
}

/// Raw linear output and the confidence it maps to, both classes-by-one
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierResult {
    pub raw: DenseMatrix,
    pub confidence: DenseMatrix,
}

pub struct Classifier {
    config: ClassifierConfig,
    taper_coefficients: Vec<f64>,
    estimator: SpectralEstimator,
}

impl Classifier {
    /// Validate a configuration and build the classifier. Configuration
    /// problems are fatal here rather than mid-stream.
    pub fn new(config: ClassifierConfig) -> PipelineResult<Self> {
        if config.window_width == 0 || !config.window_width.is_power_of_two() {
            return Err(config_error!(
                "window width must be a power of two, got {}",
                config.window_width
            ));
        }
        if config.bias.len() != config.weights.cols() {
            return Err(config_error!(
                "bias length {} does not match {} weight columns",
                config.bias.len(),
                config.weights.cols()
            ));
        }
        if config.start_ms.is_empty() {
            return Err(config_error!("at least one sub-window start is required"));
        }
        if config.time_idx.is_empty() || config.freq_idx.is_empty() {
            return Err(config_error!(
                "time and frequency index sets must be non-empty"
            ));
        }
        if let Some(&bad) = config.time_idx.iter().find(|&&t| t >= config.start_ms.len()) {
            return Err(config_error!(
                "time index {} exceeds the {} configured sub-windows",
                bad,
                config.start_ms.len()
            ));
        }
        let bins = config.window_width / 2 + 1;
        if let Some(&bad) = config.freq_idx.iter().find(|&&f| f >= bins) {
            return Err(config_error!(
                "frequency index {} exceeds the {} spectrum bins",
                bad,
                bins
            ));
        }
        if config.downsample_factor == 0 {
            return Err(config_error!("down-sample factor must be at least 1"));
        }
        if config.sample_rate <= 0.0 {
            return Err(config_error!(
                "sample rate must be positive, got {}",
                config.sample_rate
            ));
        }

        let taper_coefficients = config.taper.generate(config.window_width);
        Ok(Classifier {
            config,
            taper_coefficients,
            estimator: SpectralEstimator::new(),
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Number of classes this classifier produces
    pub fn class_count(&self) -> usize {
        self.config.bias.len()
    }

    /// Classify one epoch, rows = samples and cols = channels
    pub fn apply(&mut self, epoch: &DenseMatrix) -> PipelineResult<ClassifierResult> {
        if epoch.is_empty() {
            return Err(config_error!("cannot classify an empty epoch"));
        }

        // channels on rows from here on
        let mut data = epoch.transpose();
        if self.config.downsample_factor > 1 {
            data = downsample_columns(&data, self.config.downsample_factor);
        }

        if self.config.bad_channel_threshold >= 0.0 {
            data = self.trim_or_keep(&data, Axis::Cols, self.config.bad_channel_threshold)?;
        }
        if self.config.bad_trial_threshold >= 0.0 {
            data = self.trim_or_keep(&data, Axis::Rows, self.config.bad_trial_threshold)?;
        }

        data = self
            .config
            .spatial_filter
            .apply(&data, self.config.whiten_threshold)?;

        let effective_rate = self.config.sample_rate / self.config.downsample_factor as f64;
        let mut spectra = Vec::with_capacity(self.config.start_ms.len());
        for &start_ms in &self.config.start_ms {
            let start = (start_ms / 1000.0 * effective_rate).round() as usize;
            let spectrum = self.estimator.welch(
                &data,
                Axis::Cols,
                &self.taper_coefficients,
                &[start],
                self.config.window_width,
                self.config.welch,
            )?;
            spectra.push(spectrum);
        }

        // window-major, then frequency, then channel
        let channels = data.rows();
        let mut features =
            Vec::with_capacity(self.config.time_idx.len() * self.config.freq_idx.len() * channels);
        for &w in &self.config.time_idx {
            for &f in &self.config.freq_idx {
                for ch in 0..channels {
                    features.push(spectra[w].get(ch, f));
                }
            }
        }
        if features.len() != self.config.weights.rows() {
            return Err(config_error!(
                "feature vector length {} does not match {} weight rows",
                features.len(),
                self.config.weights.rows()
            ));
        }

        let x = DenseMatrix::from_column(&features);
        let mut raw = self.config.weights.transpose().matmul(&x)?;
        for (class, &bias) in self.config.bias.iter().enumerate() {
            raw.set(class, 0, raw.get(class, 0) + bias);
        }

        let confidence = self.config.decision.transform(&raw);
        Ok(ClassifierResult { raw, confidence })
    }

    fn trim_or_keep(
        &self,
        data: &DenseMatrix,
        axis: Axis,
        threshold: f64,
    ) -> PipelineResult<DenseMatrix> {
        match remove_outliers(data, axis, -threshold, threshold, 1, OutlierFeature::Variance)? {
            Some(trimmed) => Ok(trimmed),
            None => {
                warn!(
                    ?axis,
                    threshold, "outlier rejection removed everything, keeping untrimmed data"
                );
                Ok(data.clone())
            }
        }
    }
}

fn downsample_columns(data: &DenseMatrix, factor: usize) -> DenseMatrix {
    let kept = data.cols().div_ceil(factor);
    let mut out = DenseMatrix::zeros(data.rows(), kept);
    for c in 0..kept {
        for r in 0..data.rows() {
            out.set(r, c, data.get(r, c * factor));
        }
    }
    out
}
