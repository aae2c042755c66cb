//! Cross-validation fold generation
//!
//! Includes:
//! - K-Fold cross-validation
//! - Stratified K-Fold (class proportions preserved per fold)
//! - Explicit, caller-supplied folds
//!
//! Shuffling always goes through a seeded `StdRng`.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::estimator::unique_labels;
use crate::error::{DecodingError, DecodingResult};

/// One cross-validation split over the trial axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl Fold {
    pub fn new(train_indices: Vec<usize>, test_indices: Vec<usize>) -> Self {
        Self {
            train_indices,
            test_indices,
        }
    }

    /// Fold testing on `test_indices` and training on every other trial
    fn complement(n_samples: usize, mut test_indices: Vec<usize>) -> Self {
        test_indices.sort_unstable();
        let mut is_test = vec![false; n_samples];
        for &i in &test_indices {
            is_test[i] = true;
        }
        let train_indices = (0..n_samples).filter(|&i| !is_test[i]).collect();
        Self::new(train_indices, test_indices)
    }
}

/// Splitter capability: labels in, ordered folds out
pub trait Splitter {
    fn split(&self, y: &Array1<f64>) -> DecodingResult<Vec<Fold>>;
}

/// Sizes of `n_splits` near-equal chunks of `n`; the first `n % n_splits` get one extra
fn fold_sizes(n: usize, n_splits: usize) -> Vec<usize> {
    (0..n_splits)
        .map(|i| n / n_splits + usize::from(i < n % n_splits))
        .collect()
}

fn check_n_splits(n_splits: usize, n_samples: usize) -> DecodingResult<()> {
    if n_splits < 2 {
        return Err(DecodingError::config(format!(
            "n_splits must be > 1, got {}",
            n_splits
        )));
    }
    if n_samples < n_splits {
        return Err(DecodingError::config(format!(
            "cannot split {} trials into {} folds",
            n_samples, n_splits
        )));
    }
    Ok(())
}

/// Plain K-Fold: contiguous (optionally shuffled) chunks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: 0,
        }
    }

    pub fn shuffled(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle: true,
            seed,
        }
    }
}

impl Splitter for KFold {
    fn split(&self, y: &Array1<f64>) -> DecodingResult<Vec<Fold>> {
        let n_samples = y.len();
        check_n_splits(self.n_splits, n_samples)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            indices.shuffle(&mut rng);
        }

        let mut start = 0;
        Ok(fold_sizes(n_samples, self.n_splits)
            .into_iter()
            .map(|size| {
                let test = indices[start..start + size].to_vec();
                start += size;
                Fold::complement(n_samples, test)
            })
            .collect())
    }
}

/// Stratified K-Fold: each class is spread evenly over the folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: 0,
        }
    }

    pub fn shuffled(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle: true,
            seed,
        }
    }
}

impl Splitter for StratifiedKFold {
    fn split(&self, y: &Array1<f64>) -> DecodingResult<Vec<Fold>> {
        let n_samples = y.len();
        check_n_splits(self.n_splits, n_samples)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        // Fold that receives the next class's first leftover trial
        let mut offset = 0;

        for class in unique_labels(y) {
            let mut members: Vec<usize> = (0..n_samples).filter(|&i| y[i] == class).collect();
            if members.len() < self.n_splits {
                warn!(
                    "Class {} has only {} trials, fewer than {} folds",
                    class,
                    members.len(),
                    self.n_splits
                );
            }
            if self.shuffle {
                members.shuffle(&mut rng);
            }

            let mut start = 0;
            for (j, size) in fold_sizes(members.len(), self.n_splits).into_iter().enumerate() {
                let fold = (offset + j) % self.n_splits;
                tests[fold].extend_from_slice(&members[start..start + size]);
                start += size;
            }
            offset = (offset + members.len() % self.n_splits) % self.n_splits;
        }

        Ok(tests
            .into_iter()
            .map(|test| Fold::complement(n_samples, test))
            .collect())
    }
}

/// Cross-validation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CvPolicy {
    /// Stratified for classifiers, plain K-Fold for regressors
    ///
    /// Trials are shuffled before splitting only when `seed` is set.
    Auto {
        n_splits: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    KFold {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: u64,
    },
    Stratified {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: u64,
    },
    /// Caller-supplied folds
    Explicit { folds: Vec<Fold> },
}

impl Default for CvPolicy {
    fn default() -> Self {
        CvPolicy::Auto {
            n_splits: 5,
            seed: None,
        }
    }
}

impl CvPolicy {
    /// Produce and validate the folds for labels `y`
    pub fn resolve(&self, y: &Array1<f64>, is_classifier: bool) -> DecodingResult<Vec<Fold>> {
        let folds = match *self {
            CvPolicy::Auto { n_splits, seed } if is_classifier => StratifiedKFold {
                n_splits,
                shuffle: seed.is_some(),
                seed: seed.unwrap_or_default(),
            }
            .split(y)?,
            CvPolicy::Auto { n_splits, seed } => KFold {
                n_splits,
                shuffle: seed.is_some(),
                seed: seed.unwrap_or_default(),
            }
            .split(y)?,
            CvPolicy::KFold {
                n_splits,
                shuffle,
                seed,
            } => KFold {
                n_splits,
                shuffle,
                seed,
            }
            .split(y)?,
            CvPolicy::Stratified {
                n_splits,
                shuffle,
                seed,
            } => StratifiedKFold {
                n_splits,
                shuffle,
                seed,
            }
            .split(y)?,
            CvPolicy::Explicit { ref folds } => folds.clone(),
        };

        validate_folds(&folds, y.len())?;
        Ok(folds)
    }
}

/// Check a fold set before any fitting work is done
///
/// Empty training sets are fatal; empty test sets only warn.
pub fn validate_folds(folds: &[Fold], n_trials: usize) -> DecodingResult<()> {
    if folds.is_empty() {
        return Err(DecodingError::config("cross-validation produced no folds"));
    }

    for (k, fold) in folds.iter().enumerate() {
        if fold.train_indices.is_empty() {
            return Err(DecodingError::EmptyTrainFold { fold: k });
        }
        if let Some(&bad) = fold
            .train_indices
            .iter()
            .chain(fold.test_indices.iter())
            .find(|&&i| i >= n_trials)
        {
            return Err(DecodingError::data(format!(
                "fold {} refers to trial {} but only {} trials are available",
                k, bad, n_trials
            )));
        }
        if fold.test_indices.is_empty() {
            warn!("Fold {} has no test trials and will not contribute predictions", k);
        }
    }

    Ok(())
}
