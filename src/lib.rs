//! # Temporal Decoding - Generalization Across Time
//!
//! Fits a classifier at each time window of multi-trial, multi-channel
//! recordings and evaluates every fitted classifier at every other time
//! window, producing a train-time × test-time generalization matrix.
//!
//! - Time window planning (seconds to sample windows, diagonal or full grids)
//! - Cross-validated fitting, one estimator per (window, fold)
//! - Matched (held-out fold) or fold-averaged prediction
//! - Accuracy, ROC AUC, R² or custom scoring per grid cell
//! - Generalization across experimental conditions
//!
//! ## Example
//!
//! ```rust,no_run
//! use temporal_decoding::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let epochs = SyntheticEpochs::default().generate()?;
//!
//!     let mut gat = GeneralizationAcrossTime::new(GatConfig::default());
//!     gat.fit(&epochs, None)?;
//!     gat.predict(&epochs, &PredictOptions::new())?;
//!     let scores = gat.score(None, None)?;
//!
//!     println!("{}", scores);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod gat;
pub mod ml;

pub use data::{ChannelSelector, DataLoader, Epochs, SyntheticEpochs, TimeAxis, TrialDataset};
pub use error::{DecodingError, DecodingResult, ErrorKind};
pub use gat::{GatConfig, GeneralizationAcrossTime, PredictOptions, ScoreMatrix};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{
        ChannelInfo, ChannelKind, ChannelSelector, DataAdapter, DataLoader, Epochs,
        SyntheticEpochs, TimeAxis, TrialDataset,
    };
    pub use crate::error::{DecodingError, DecodingResult, ErrorKind};
    pub use crate::gat::{
        time_generalization, time_generalization_with, FailurePolicy, GatConfig,
        GeneralizationAcrossTime, Parallelism, PredictMode, PredictOptions, Predictions,
        ScoreMatrix, TestWindows, TimeGeneralization, TimeGeneralizationOptions, TimeWindows,
        Window, WindowConfig,
    };
    pub use crate::ml::{
        CvPolicy, DefaultClassifier, Estimator, EstimatorError, Fold, KFold, KNNClassifier,
        KNNRegressor, LogisticRegression, Metrics, PredictType, Scorer, Splitter,
        Standardized, StratifiedKFold,
    };
}
