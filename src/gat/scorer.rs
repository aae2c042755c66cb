//! Scoring of the generalization grid
//!
//! Each (train window, test window) cell compares the covered trials'
//! predictions with the ground truth:
//!
//! - one output column: the scorer is applied directly
//! - one column per class: one-vs-rest scores averaged over classes

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use tracing::{info, warn};

use super::predictor::Predictions;
use crate::error::{DecodingError, DecodingResult};
use crate::ml::estimator::{unique_labels, PredictType};
use crate::ml::metrics::{MetricError, Scorer};

/// Scores indexed (train window, test window); rows may differ in length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    rows: Vec<Vec<f64>>,
}

impl ScoreMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, train: usize) -> &[f64] {
        &self.rows[train]
    }

    pub fn get(&self, train: usize, test: usize) -> Option<f64> {
        self.rows.get(train)?.get(test).copied()
    }

    pub fn n_train(&self) -> usize {
        self.rows.len()
    }

    pub fn max_row_len(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// (rows, longest row)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.max_row_len())
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.windows(2).all(|pair| pair[0].len() == pair[1].len())
    }

    /// `scores[i][i]` for every row long enough to have it
    pub fn diagonal(&self) -> Vec<f64> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.get(i).copied())
            .collect()
    }

    /// Dense copy, if every row has the same length
    pub fn to_array(&self) -> Option<Array2<f64>> {
        if !self.is_rectangular() {
            return None;
        }
        let (n_rows, n_cols) = self.shape();
        let flat: Vec<f64> = self.rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((n_rows, n_cols), flat).ok()
    }
}

impl Index<(usize, usize)> for ScoreMatrix {
    type Output = f64;

    fn index(&self, (train, test): (usize, usize)) -> &f64 {
        &self.rows[train][test]
    }
}

impl fmt::Display for ScoreMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| format!("{:6.3}", v)).collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Scorer used when the caller does not pick one
pub fn default_scorer(predict_type: PredictType, is_classifier: bool) -> Scorer {
    match (predict_type, is_classifier) {
        (PredictType::Label, true) => Scorer::Accuracy,
        (PredictType::Label, false) => Scorer::R2,
        _ => Scorer::RocAuc,
    }
}

/// Score one cell
///
/// `classes` gives the label of each output column when there are several.
pub fn score_cell(
    y_true: &Array1<f64>,
    y_pred: &Array2<f64>,
    scorer: &Scorer,
    classes: &[f64],
) -> Result<f64, MetricError> {
    if y_pred.ncols() == 1 {
        let column = y_pred.column(0).to_owned();
        return scorer.evaluate(y_true, &column).or_else(|err| {
            // Binarize against the largest class and retry once
            match classes.last() {
                Some(&positive) => scorer
                    .evaluate(&binarize(y_true.view(), positive), &column)
                    .map_err(|_| err),
                None => Err(err),
            }
        });
    }

    let mut total = 0.0;
    for (c, &class) in classes.iter().enumerate().take(y_pred.ncols()) {
        let column = y_pred.column(c).to_owned();
        total += scorer.evaluate(&binarize(y_true.view(), class), &column)?;
    }
    Ok(total / y_pred.ncols() as f64)
}

fn binarize(y: ArrayView1<'_, f64>, positive: f64) -> Array1<f64> {
    y.mapv(|v| if v == positive { 1.0 } else { 0.0 })
}

/// Scores every cell of `predictions`
pub struct GridScorer<'a> {
    pub scorer: &'a Scorer,
    /// Training classes, `None` for regressors
    pub classes: Option<&'a [f64]>,
    /// Score given to cells of failed training windows
    pub sentinel: f64,
}

impl<'a> GridScorer<'a> {
    pub fn score(&self, predictions: &Predictions, y_true: &Array1<f64>) -> DecodingResult<ScoreMatrix> {
        if y_true.len() != predictions.n_trials() {
            return Err(DecodingError::data(format!(
                "{} ground truth values for {} predicted trials",
                y_true.len(),
                predictions.n_trials()
            )));
        }

        let covered: Vec<usize> = (0..predictions.n_trials())
            .filter(|&i| predictions.covered()[i])
            .collect();
        if covered.is_empty() {
            return Err(DecodingError::data("no trial received a prediction"));
        }
        if covered.len() < predictions.n_trials() {
            warn!(
                "Scoring {} of {} trials; the rest had no prediction",
                covered.len(),
                predictions.n_trials()
            );
        }
        let y_covered: Array1<f64> = covered.iter().map(|&i| y_true[i]).collect();

        let classes = match self.classes {
            Some(classes) => {
                if let Some(unseen) = y_covered.iter().find(|&&v| !classes.contains(&v)) {
                    return Err(DecodingError::data(format!(
                        "label {} was not seen during fit (classes {:?})",
                        unseen, classes
                    )));
                }
                classes.to_vec()
            }
            None => unique_labels(&y_covered),
        };
        if predictions.output_dim() > 1 && predictions.output_dim() != classes.len() {
            return Err(DecodingError::data(format!(
                "{} output columns for {} classes",
                predictions.output_dim(),
                classes.len()
            )));
        }

        info!(
            "Scoring {} training windows with {}",
            predictions.n_train_windows(),
            self.scorer
        );

        let mut rows = Vec::with_capacity(predictions.n_train_windows());
        for train in 0..predictions.n_train_windows() {
            if predictions.is_failed(train) {
                rows.push(vec![self.sentinel; predictions.n_test_windows(train)]);
                continue;
            }
            let row = predictions
                .row(train)
                .iter()
                .enumerate()
                .map(|(test, cell)| {
                    let y_pred = cell.select(ndarray::Axis(0), &covered);
                    score_cell(&y_covered, &y_pred, self.scorer, &classes)
                        .map_err(|source| DecodingError::Scoring { train, test, source })
                })
                .collect::<DecodingResult<Vec<f64>>>()?;
            rows.push(row);
        }

        Ok(ScoreMatrix::new(rows))
    }
}
