//! Generalization across time and conditions
//!
//! Convenience wrapper: the k-th condition dataset is labelled `k`, the
//! decoder is cross-validated on the stacked conditions and, optionally,
//! evaluated on a second set of held-out conditions.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::orchestrator::{GatConfig, GeneralizationAcrossTime, PredictOptions};
use super::predictor::PredictMode;
use super::scorer::ScoreMatrix;
use crate::data::types::{Epochs, TrialDataset};
use crate::error::DecodingResult;
use crate::ml::estimator::Estimator;
use crate::ml::metrics::Scorer;
use crate::ml::scaler::DefaultClassifier;

/// Options for [`time_generalization`]
#[derive(Debug, Clone, Default)]
pub struct TimeGeneralizationOptions {
    pub config: GatConfig,
    /// Defaults to the decoder's default scorer
    pub scorer: Option<Scorer>,
}

/// Scores of [`time_generalization`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGeneralization {
    /// Cross-validated scores on the training conditions
    pub scores: ScoreMatrix,
    /// Scores on the held-out conditions, if any were given
    pub scores_generalize: Option<ScoreMatrix>,
    /// Start time of each training window
    pub times: Vec<f64>,
}

/// Decode the condition of each trial across time with the default classifier
pub fn time_generalization(
    conditions: &[Epochs],
    generalize: Option<&[Epochs]>,
    options: &TimeGeneralizationOptions,
) -> DecodingResult<TimeGeneralization> {
    time_generalization_with(DefaultClassifier::default(), conditions, generalize, options)
}

/// Same as [`time_generalization`] with a caller-chosen estimator
pub fn time_generalization_with<E: Estimator>(
    estimator: E,
    conditions: &[Epochs],
    generalize: Option<&[Epochs]>,
    options: &TimeGeneralizationOptions,
) -> DecodingResult<TimeGeneralization> {
    let epochs = Epochs::concatenate_conditions(conditions)?;
    info!(
        "Decoding {} conditions over {} trials",
        conditions.len(),
        epochs.n_trials()
    );

    let mut gat = GeneralizationAcrossTime::with_estimator(estimator, options.config.clone());
    gat.fit(&epochs, None)?;

    let matched = PredictOptions::new().with_mode(PredictMode::CrossValidation);
    gat.predict(&epochs, &matched)?;
    let scores = gat.score(None, options.scorer.clone())?.clone();

    let scores_generalize = match generalize {
        Some(held_out) => {
            let epochs_gen = Epochs::concatenate_conditions(held_out)?;
            let independent = PredictOptions::new().with_mode(PredictMode::MeanPrediction);
            gat.predict(&epochs_gen, &independent)?;
            Some(gat.score(None, options.scorer.clone())?.clone())
        }
        None => None,
    };

    let times = gat.train_windows().map(|w| w.times()).unwrap_or_default();

    Ok(TimeGeneralization {
        scores,
        scores_generalize,
        times,
    })
}
