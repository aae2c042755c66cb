//! Synthetic evoked-response epochs
//!
//! Each class gets its own spatial pattern that is added to the trials of
//! that class inside an effect interval, on top of Gaussian sensor noise.
//! Useful for demos, benchmarks and tests.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::types::Epochs;
use crate::error::{DecodingError, DecodingResult};

/// Parameters of the synthetic generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticEpochs {
    pub n_trials: usize,
    pub n_channels: usize,
    pub n_samples: usize,
    pub sfreq: f64,
    pub tmin: f64,
    pub n_classes: usize,
    /// Effect interval start (seconds)
    pub effect_start: f64,
    /// Effect interval end (seconds)
    pub effect_stop: f64,
    /// Amplitude of the class patterns
    pub effect_size: f64,
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticEpochs {
    fn default() -> Self {
        Self {
            n_trials: 40,
            n_channels: 8,
            n_samples: 30,
            sfreq: 100.0,
            tmin: -0.1,
            n_classes: 2,
            effect_start: 0.0,
            effect_stop: 0.12,
            effect_size: 1.5,
            noise_std: 1.0,
            seed: 42,
        }
    }
}

impl SyntheticEpochs {
    /// Generate epochs; trial `i` belongs to class `i % n_classes`
    pub fn generate(&self) -> DecodingResult<Epochs> {
        if self.n_classes < 2 {
            return Err(DecodingError::config("at least 2 classes are required"));
        }
        let noise = Normal::new(0.0, self.noise_std).map_err(|e| {
            DecodingError::config(format!("invalid noise std {}: {}", self.noise_std, e))
        })?;
        let unit = Normal::new(0.0, 1.0)
            .map_err(|e| DecodingError::config(format!("invalid pattern distribution: {}", e)))?;

        let mut rng = StdRng::seed_from_u64(self.seed);

        let patterns = Array2::from_shape_fn((self.n_classes, self.n_channels), |_| {
            unit.sample(&mut rng) * self.effect_size
        });

        let dt = 1.0 / self.sfreq;
        let in_effect: Vec<bool> = (0..self.n_samples)
            .map(|s| {
                let t = self.tmin + s as f64 * dt;
                t >= self.effect_start - 1e-9 && t <= self.effect_stop + 1e-9
            })
            .collect();

        let mut data = Array3::<f64>::zeros((self.n_trials, self.n_channels, self.n_samples));
        for ((trial, channel, sample), value) in data.indexed_iter_mut() {
            *value = noise.sample(&mut rng);
            if in_effect[sample] {
                *value += patterns[[trial % self.n_classes, channel]];
            }
        }

        let events = (0..self.n_trials)
            .map(|i| (i % self.n_classes) as f64)
            .collect();

        Epochs::from_eeg(data, self.tmin, self.sfreq, Some(events))
    }
}
