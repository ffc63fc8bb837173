//! BCI-Processing: Feature extraction and classification for epoch streams
//!
//! Spectral estimation (Welch), spatial filtering, outlier rejection, and
//! the linear epoch classifier built on the bci-core matrix types.

pub mod classifier;
pub mod outliers;
pub mod spatial;
pub mod spectral;
pub mod taper;

pub use classifier::{Classifier, ClassifierConfig, ClassifierResult, DecisionKind};
pub use outliers::{remove_outliers, OutlierFeature};
pub use spatial::{car_matrix, whitening_matrix, SpatialFilterKind, DEFAULT_WHITEN_THRESHOLD};
pub use spectral::{SpectralEstimator, TransformDirection, WelchOptions, WelchOutput};
pub use taper::Taper;
