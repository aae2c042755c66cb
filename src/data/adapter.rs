//! Conversion of trial datasets into decoder inputs
//!
//! Resolves a channel selection policy into channel indices and extracts
//! the (trials × features × samples) array plus the label vector.

use ndarray::{Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{ChannelInfo, ChannelKind, TrialDataset};
use crate::error::{DecodingError, DecodingResult};

/// Channel selection policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelector {
    /// MEG and EEG channels not flagged bad
    #[default]
    DataChannels,
    /// Channels of the given kinds, not flagged bad
    Kinds(Vec<ChannelKind>),
    /// Explicit channel indices, bad flags ignored
    Indices(Vec<usize>),
    /// Every channel
    All,
}

impl ChannelSelector {
    /// Resolve the policy into channel indices
    pub fn resolve(&self, channels: &[ChannelInfo]) -> DecodingResult<Vec<usize>> {
        let picks: Vec<usize> = match self {
            ChannelSelector::DataChannels => channels
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind.is_data() && !c.bad)
                .map(|(i, _)| i)
                .collect(),
            ChannelSelector::Kinds(kinds) => channels
                .iter()
                .enumerate()
                .filter(|(_, c)| kinds.contains(&c.kind) && !c.bad)
                .map(|(i, _)| i)
                .collect(),
            ChannelSelector::Indices(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= channels.len()) {
                    return Err(DecodingError::data(format!(
                        "channel index {} out of range for {} channels",
                        bad,
                        channels.len()
                    )));
                }
                indices.clone()
            }
            ChannelSelector::All => (0..channels.len()).collect(),
        };

        if picks.is_empty() {
            return Err(DecodingError::data(format!(
                "channel selection {:?} matched no channel",
                self
            )));
        }

        Ok(picks)
    }
}

/// Extracts decoder inputs from trial datasets
pub struct DataAdapter;

impl DataAdapter {
    /// Data restricted to `picks`, as (trials, features, samples)
    pub fn extract<D: TrialDataset + ?Sized>(
        dataset: &D,
        picks: &[usize],
    ) -> DecodingResult<Array3<f64>> {
        let data = dataset.data();
        let n_channels = data.len_of(Axis(1));
        if let Some(&bad) = picks.iter().find(|&&i| i >= n_channels) {
            return Err(DecodingError::data(format!(
                "channel index {} out of range for a dataset with {} channels",
                bad, n_channels
            )));
        }
        Ok(data.select(Axis(1), picks))
    }

    /// Labels supplied by the caller, or the dataset's own trial tags
    pub fn labels<D: TrialDataset + ?Sized>(
        dataset: &D,
        labels: Option<&Array1<f64>>,
    ) -> Option<Array1<f64>> {
        labels.cloned().or_else(|| dataset.trial_labels())
    }

    /// Produce `(X, y)`; fails if no labels are available or counts differ
    pub fn adapt<D: TrialDataset + ?Sized>(
        dataset: &D,
        labels: Option<&Array1<f64>>,
        picks: &[usize],
    ) -> DecodingResult<(Array3<f64>, Array1<f64>)> {
        let x = Self::extract(dataset, picks)?;
        let y = Self::labels(dataset, labels).ok_or_else(|| {
            DecodingError::data("no labels given and the dataset carries no trial tags")
        })?;

        if x.len_of(Axis(0)) != y.len() {
            return Err(DecodingError::data(format!(
                "{} trials but {} labels",
                x.len_of(Axis(0)),
                y.len()
            )));
        }

        debug!(
            "Adapted data: {} trials, {} features, {} samples",
            x.len_of(Axis(0)),
            x.len_of(Axis(1)),
            x.len_of(Axis(2))
        );

        Ok((x, y))
    }
}
