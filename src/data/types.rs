//! Core data types for epoched trial data
//!
//! - TimeAxis: sample count, start time and sampling interval of a trial
//! - ChannelInfo: channel name, type and bad flag
//! - Epochs: trials × channels × samples with optional per-trial condition codes
//! - TrialDataset: the capability the decoder consumes

use ndarray::{s, Array1, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DecodingError, DecodingResult};

/// Time axis shared by every trial of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    /// Number of time samples per trial
    pub n_samples: usize,
    /// Time of the first sample (seconds)
    pub tmin: f64,
    /// Seconds between consecutive samples
    pub sampling_interval: f64,
}

impl TimeAxis {
    pub fn new(n_samples: usize, tmin: f64, sampling_interval: f64) -> Self {
        Self {
            n_samples,
            tmin,
            sampling_interval,
        }
    }

    /// Build from a sampling frequency in Hz
    pub fn from_sfreq(n_samples: usize, tmin: f64, sfreq: f64) -> Self {
        Self::new(n_samples, tmin, 1.0 / sfreq)
    }

    /// Time of sample `idx` (seconds)
    pub fn time_at(&self, idx: usize) -> f64 {
        self.tmin + idx as f64 * self.sampling_interval
    }

    /// Time of the last sample
    pub fn tmax(&self) -> f64 {
        self.time_at(self.n_samples.saturating_sub(1))
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.n_samples).map(|i| self.time_at(i)).collect()
    }
}

/// Sensor type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Magnetometer
    Mag,
    /// Gradiometer
    Grad,
    Eeg,
    Eog,
    Ecg,
    Stim,
    Misc,
}

impl ChannelKind {
    /// MEG or EEG sensor carrying brain signal
    pub fn is_data(&self) -> bool {
        matches!(self, ChannelKind::Mag | ChannelKind::Grad | ChannelKind::Eeg)
    }
}

/// Channel metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
    /// Flagged as bad and excluded from default selections
    #[serde(default)]
    pub bad: bool,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bad: false,
        }
    }

    pub fn bad(mut self) -> Self {
        self.bad = true;
        self
    }
}

/// Trial dataset capability consumed by the decoder
pub trait TrialDataset {
    /// Data as (trials, channels, samples)
    fn data(&self) -> ArrayView3<'_, f64>;

    fn time_axis(&self) -> TimeAxis;

    fn channels(&self) -> &[ChannelInfo];

    /// Intrinsic per-trial categorical tag, if any
    fn trial_labels(&self) -> Option<Array1<f64>>;

    fn n_trials(&self) -> usize {
        self.data().len_of(Axis(0))
    }
}

/// Epoched recording: one row per trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epochs {
    data: Array3<f64>,
    time_axis: TimeAxis,
    channels: Vec<ChannelInfo>,
    /// Condition code of each trial
    events: Option<Vec<f64>>,
}

impl Epochs {
    /// Create epochs, checking that channels and events match the data shape
    pub fn new(
        data: Array3<f64>,
        tmin: f64,
        sfreq: f64,
        channels: Vec<ChannelInfo>,
        events: Option<Vec<f64>>,
    ) -> DecodingResult<Self> {
        let (n_trials, n_channels, n_samples) = data.dim();

        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(DecodingError::data(format!(
                "sampling frequency must be positive, got {}",
                sfreq
            )));
        }
        if channels.len() != n_channels {
            return Err(DecodingError::data(format!(
                "{} channel descriptions for {} data channels",
                channels.len(),
                n_channels
            )));
        }
        if let Some(ref events) = events {
            if events.len() != n_trials {
                return Err(DecodingError::data(format!(
                    "{} events for {} trials",
                    events.len(),
                    n_trials
                )));
            }
        }

        Ok(Self {
            data,
            time_axis: TimeAxis::from_sfreq(n_samples, tmin, sfreq),
            channels,
            events,
        })
    }

    /// Epochs with `n_channels` EEG channels named `EEG 001`, ...
    pub fn from_eeg(
        data: Array3<f64>,
        tmin: f64,
        sfreq: f64,
        events: Option<Vec<f64>>,
    ) -> DecodingResult<Self> {
        let channels = (0..data.len_of(Axis(1)))
            .map(|i| ChannelInfo::new(format!("EEG {:03}", i + 1), ChannelKind::Eeg))
            .collect();
        Self::new(data, tmin, sfreq, channels, events)
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn events(&self) -> Option<&[f64]> {
        self.events.as_deref()
    }

    /// Overwrite the per-trial condition codes
    pub fn set_events(&mut self, events: Vec<f64>) -> DecodingResult<()> {
        if events.len() != self.n_trials() {
            return Err(DecodingError::data(format!(
                "{} events for {} trials",
                events.len(),
                self.n_trials()
            )));
        }
        self.events = Some(events);
        Ok(())
    }

    /// Flag a channel as bad by name
    pub fn mark_bad(&mut self, name: &str) -> bool {
        match self.channels.iter_mut().find(|c| c.name == name) {
            Some(channel) => {
                channel.bad = true;
                true
            }
            None => false,
        }
    }

    /// Subset of trials, in the given order
    pub fn select(&self, indices: &[usize]) -> DecodingResult<Epochs> {
        let n_trials = self.n_trials();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_trials) {
            return Err(DecodingError::data(format!(
                "trial index {} out of range for {} trials",
                bad, n_trials
            )));
        }

        Ok(Epochs {
            data: self.data.select(Axis(0), indices),
            time_axis: self.time_axis,
            channels: self.channels.clone(),
            events: self
                .events
                .as_ref()
                .map(|ev| indices.iter().map(|&i| ev[i]).collect()),
        })
    }

    /// Contiguous range of trials
    pub fn slice_trials(&self, range: std::ops::Range<usize>) -> DecodingResult<Epochs> {
        let indices: Vec<usize> = range.collect();
        self.select(&indices)
    }

    /// Keep the samples in `[start, stop)`
    pub fn crop(&self, start: usize, stop: usize) -> DecodingResult<Epochs> {
        if start >= stop || stop > self.time_axis.n_samples {
            return Err(DecodingError::data(format!(
                "invalid crop [{}, {}) for {} samples",
                start, stop, self.time_axis.n_samples
            )));
        }
        Ok(Epochs {
            data: self.data.slice(s![.., .., start..stop]).to_owned(),
            time_axis: TimeAxis::new(
                stop - start,
                self.time_axis.time_at(start),
                self.time_axis.sampling_interval,
            ),
            channels: self.channels.clone(),
            events: self.events.clone(),
        })
    }

    /// Stack several condition datasets; trials of the k-th dataset get condition code `k`
    pub fn concatenate_conditions(conditions: &[Epochs]) -> DecodingResult<Epochs> {
        let first = conditions
            .first()
            .ok_or_else(|| DecodingError::data("no condition datasets given"))?;

        for (k, epochs) in conditions.iter().enumerate().skip(1) {
            if epochs.channels != first.channels {
                return Err(DecodingError::data(format!(
                    "condition {} has different channels than condition 0",
                    k
                )));
            }
            if epochs.time_axis.n_samples != first.time_axis.n_samples {
                return Err(DecodingError::data(format!(
                    "condition {} has {} samples per trial, expected {}",
                    k, epochs.time_axis.n_samples, first.time_axis.n_samples
                )));
            }
        }

        let views: Vec<ArrayView3<'_, f64>> = conditions.iter().map(|e| e.data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| DecodingError::data(format!("cannot stack conditions: {}", e)))?;
        let events = conditions
            .iter()
            .enumerate()
            .flat_map(|(k, e)| std::iter::repeat(k as f64).take(e.n_trials()))
            .collect();

        Ok(Epochs {
            data,
            time_axis: first.time_axis,
            channels: first.channels.clone(),
            events: Some(events),
        })
    }
}

impl TrialDataset for Epochs {
    fn data(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    fn time_axis(&self) -> TimeAxis {
        self.time_axis
    }

    fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    fn trial_labels(&self) -> Option<Array1<f64>> {
        self.events.as_ref().map(|ev| Array1::from_vec(ev.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn epochs(n_trials: usize) -> Epochs {
        let data = Array3::from_shape_fn((n_trials, 2, 5), |(t, c, s)| (t * 100 + c * 10 + s) as f64);
        let events = (0..n_trials).map(|i| (i % 2) as f64).collect();
        Epochs::from_eeg(data, -0.1, 50.0, Some(events)).unwrap()
    }

    #[test]
    fn test_time_axis() {
        let axis = TimeAxis::from_sfreq(5, -0.1, 50.0);
        assert_relative_eq!(axis.sampling_interval, 0.02);
        assert_relative_eq!(axis.time_at(0), -0.1);
        assert_relative_eq!(axis.tmax(), -0.02, epsilon = 1e-12);
        assert_eq!(axis.times().len(), 5);
    }

    #[test]
    fn test_event_count_mismatch() {
        let data = Array3::zeros((4, 2, 5));
        let result = Epochs::from_eeg(data, 0.0, 100.0, Some(vec![0.0, 1.0]));
        assert!(matches!(result, Err(DecodingError::Data(_))));
    }

    #[test]
    fn test_select_keeps_events() {
        let ep = epochs(6);
        let sub = ep.select(&[5, 0]).unwrap();
        assert_eq!(sub.n_trials(), 2);
        assert_eq!(sub.events().unwrap(), &[1.0, 0.0]);
        assert_eq!(sub.data()[[0, 1, 2]], 512.0);
        assert!(ep.select(&[6]).is_err());
    }

    #[test]
    fn test_crop() {
        let ep = epochs(2).crop(1, 4).unwrap();
        assert_eq!(ep.time_axis().n_samples, 3);
        assert_relative_eq!(ep.time_axis().tmin, -0.08, epsilon = 1e-12);
        assert_eq!(ep.data()[[1, 0, 0]], 101.0);
    }

    #[test]
    fn test_concatenate_conditions() {
        let stacked = Epochs::concatenate_conditions(&[epochs(3), epochs(2)]).unwrap();
        assert_eq!(stacked.n_trials(), 5);
        assert_eq!(stacked.events().unwrap(), &[0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mark_bad() {
        let mut ep = epochs(2);
        assert!(ep.mark_bad("EEG 002"));
        assert!(ep.channels()[1].bad);
        assert!(!ep.mark_bad("MEG 999"));
    }
}
