//! Temporal generalization engine
//!
//! Window planning, fold-aware fitting, prediction over the (train, test)
//! window grid, scoring, and the decoder that ties them together.

pub mod conditions;
pub mod fitter;
pub mod orchestrator;
pub mod predictor;
pub mod scorer;
pub mod windows;

pub use conditions::{
    time_generalization, time_generalization_with, TimeGeneralization, TimeGeneralizationOptions,
};
pub use fitter::{flatten_window, FailurePolicy, FittedModels, FoldAwareFitter, Parallelism, WindowModels};
pub use orchestrator::{GatConfig, GeneralizationAcrossTime, PredictOptions};
pub use predictor::{aggregate_folds, PredictMode, PredictionEngine, Predictions};
pub use scorer::{default_scorer, score_cell, GridScorer, ScoreMatrix};
pub use windows::{TestWindowGrid, TestWindows, TimeWindowPlanner, TimeWindows, Window, WindowConfig};
