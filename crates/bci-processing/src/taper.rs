//! Taper (window function) generation for spectral estimation

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window function applied before the spectral transform to limit leakage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Taper {
    /// Raised cosine, the classifier default
    Hanning,
    Hamming,
    Blackman,
    /// All ones; no leakage suppression
    Rectangular,
}

impl Taper {
    /// Generate the window coefficients for a given length
    pub fn generate(self, length: usize) -> Vec<f64> {
        if length == 0 {
            return Vec::new();
        }
        if length == 1 {
            return vec![1.0];
        }
        let n = (length - 1) as f64;
        (0..length)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / n;
                match self {
                    Taper::Hanning => 0.5 - 0.5 * phase.cos(),
                    Taper::Hamming => 0.54 - 0.46 * phase.cos(),
                    Taper::Blackman => {
                        0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
                    }
                    Taper::Rectangular => 1.0,
                }
            })
            .collect()
    }
}
