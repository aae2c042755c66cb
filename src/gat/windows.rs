//! Time window planning
//!
//! Turns a window configuration expressed in seconds (or explicit sample
//! windows) into the ordered training windows, and derives the per-training
//! window test windows that define the generalization grid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::debug;

use crate::data::types::TimeAxis;
use crate::error::{DecodingError, DecodingResult};

/// Contiguous run of time-sample indices consumed by one classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// First sample index
    pub start: usize,
    /// Number of samples
    pub length: usize,
}

impl Window {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// One past the last sample index
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end()
    }

    fn check_bounds(&self, n_samples: usize) -> DecodingResult<()> {
        if self.length == 0 {
            return Err(DecodingError::config(format!(
                "window starting at sample {} is empty",
                self.start
            )));
        }
        if self.end() > n_samples {
            return Err(DecodingError::config(format!(
                "window [{}, {}) runs past the {} available samples",
                self.start,
                self.end(),
                n_samples
            )));
        }
        Ok(())
    }
}

/// Window configuration
///
/// Times are in seconds. Unset fields default to: first sample, last
/// sample, one sample step, one sample length. `explicit` bypasses the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Earliest window start
    pub start: Option<f64>,
    /// Latest window end (time of the last sample a window may cover)
    pub stop: Option<f64>,
    /// Spacing between window starts
    pub step: Option<f64>,
    /// Window width
    pub length: Option<f64>,
    pub explicit: Option<Vec<Window>>,
}

impl WindowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn explicit(windows: Vec<Window>) -> Self {
        Self {
            explicit: Some(windows),
            ..Default::default()
        }
    }
}

/// Realized, ordered window sequence over a time axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeWindows {
    windows: Vec<Window>,
    axis: TimeAxis,
    /// Regular spacing in samples; `None` for explicit windows
    step: Option<usize>,
}

impl TimeWindows {
    fn new(windows: Vec<Window>, axis: TimeAxis, step: Option<usize>) -> Self {
        Self {
            windows,
            axis,
            step,
        }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Window> {
        self.windows.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Window> {
        self.windows.iter()
    }

    pub fn time_axis(&self) -> TimeAxis {
        self.axis
    }

    /// Start time of each window (seconds)
    pub fn times(&self) -> Vec<f64> {
        self.windows.iter().map(|w| self.axis.time_at(w.start)).collect()
    }
}

impl fmt::Display for TimeWindows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, last) = match (self.windows.first(), self.windows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return write!(f, "<TimeWindows | empty>"),
        };
        let dt = self.axis.sampling_interval;
        write!(
            f,
            "<TimeWindows | start: {:.6} s, stop: {:.6} s, ",
            self.axis.time_at(first.start),
            self.axis.time_at(last.end() - 1)
        )?;
        match self.step {
            Some(step) => write!(f, "step: {:.6} s, ", step as f64 * dt)?,
            None => write!(f, "step: irregular, ")?,
        }
        write!(
            f,
            "length: {:.6} s, n_windows: {}>",
            first.length as f64 * dt,
            self.windows.len()
        )
    }
}

/// How test windows are derived from the training windows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestWindows {
    /// Every training window is tested on every training window
    #[default]
    All,
    /// Each training window is tested on itself only
    Diagonal,
    /// The same planned windows for every training window
    Config(WindowConfig),
    /// One explicit list per training window
    Explicit(Vec<Vec<Window>>),
}

impl FromStr for TestWindows {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TestWindows::All),
            "diagonal" => Ok(TestWindows::Diagonal),
            other => Err(DecodingError::config(format!(
                "unknown test windows '{}' (expected 'all' or 'diagonal')",
                other
            ))),
        }
    }
}

/// Test windows indexed by training window; rows may differ in length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestWindowGrid {
    rows: Vec<Vec<Window>>,
    axis: TimeAxis,
}

impl TestWindowGrid {
    /// Test windows of training window `train`
    pub fn row(&self, train: usize) -> &[Window] {
        &self.rows[train]
    }

    pub fn rows(&self) -> &[Vec<Window>] {
        &self.rows
    }

    pub fn n_train(&self) -> usize {
        self.rows.len()
    }

    /// Same number of test windows for every training window
    pub fn is_uniform(&self) -> bool {
        self.rows.windows(2).all(|pair| pair[0].len() == pair[1].len())
    }

    /// Start times of the test windows of training window `train`
    pub fn times(&self, train: usize) -> Vec<f64> {
        self.rows[train]
            .iter()
            .map(|w| self.axis.time_at(w.start))
            .collect()
    }
}

impl fmt::Display for TestWindowGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self.rows.iter().map(Vec::len).min().unwrap_or(0);
        let max = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        if min == max {
            write!(f, "<TestWindows | n_windows: {} * {}>", self.rows.len(), min)
        } else {
            write!(
                f,
                "<TestWindows | n_windows: {} * ({}..{})>",
                self.rows.len(),
                min,
                max
            )
        }
    }
}

/// Plans training and testing windows
pub struct TimeWindowPlanner;

impl TimeWindowPlanner {
    /// Realize `config` on `axis`
    pub fn plan(axis: &TimeAxis, config: &WindowConfig) -> DecodingResult<TimeWindows> {
        let n_samples = axis.n_samples;
        if n_samples == 0 {
            return Err(DecodingError::config("the data has no time samples"));
        }
        if !(axis.sampling_interval.is_finite() && axis.sampling_interval > 0.0) {
            return Err(DecodingError::config(format!(
                "invalid sampling interval {}",
                axis.sampling_interval
            )));
        }

        if let Some(ref explicit) = config.explicit {
            if explicit.is_empty() {
                return Err(DecodingError::config("explicit window list is empty"));
            }
            for window in explicit {
                window.check_bounds(n_samples)?;
            }
            debug!("Using {} explicit windows", explicit.len());
            return Ok(TimeWindows::new(explicit.clone(), *axis, None));
        }

        let start = match config.start {
            Some(t) => Self::time_to_index(axis, t, "start")?,
            None => 0,
        };
        let stop = match config.stop {
            Some(t) => Self::time_to_index(axis, t, "stop")?,
            None => n_samples - 1,
        };
        let length = match config.length {
            Some(d) => Self::duration_to_samples(axis, d, "length")?,
            None => 1,
        };
        let step = match config.step {
            Some(d) => Self::duration_to_samples(axis, d, "step")?,
            None => 1,
        };

        if start > stop {
            return Err(DecodingError::config(format!(
                "start ({}) is after stop ({})",
                axis.time_at(start),
                axis.time_at(stop)
            )));
        }
        if length > stop + 1 - start {
            return Err(DecodingError::config(format!(
                "window length of {} samples exceeds the {} samples between start and stop",
                length,
                stop + 1 - start
            )));
        }

        let mut windows = vec![Window::new(start, length)];
        let mut window_start = start;
        while window_start
            .checked_add(step)
            .and_then(|next| next.checked_add(length))
            .map_or(false, |end| end <= stop + 1)
        {
            window_start += step;
            windows.push(Window::new(window_start, length));
        }

        debug!(
            "Planned {} windows: start={}, stop={}, step={}, length={} samples",
            windows.len(),
            start,
            stop,
            step,
            length
        );

        Ok(TimeWindows::new(windows, *axis, Some(step)))
    }

    /// Derive the test windows of every training window
    ///
    /// `axis` is the time axis of the data being predicted.
    pub fn plan_tests(
        train: &TimeWindows,
        axis: &TimeAxis,
        tests: &TestWindows,
    ) -> DecodingResult<TestWindowGrid> {
        let rows: Vec<Vec<Window>> = match tests {
            TestWindows::All => vec![train.windows().to_vec(); train.len()],
            TestWindows::Diagonal => train.iter().map(|&w| vec![w]).collect(),
            TestWindows::Config(config) => {
                let planned = Self::plan(axis, config)?;
                vec![planned.windows().to_vec(); train.len()]
            }
            TestWindows::Explicit(rows) => {
                if rows.len() != train.len() {
                    return Err(DecodingError::config(format!(
                        "{} test window lists for {} training windows",
                        rows.len(),
                        train.len()
                    )));
                }
                rows.clone()
            }
        };

        for (i, (train_window, row)) in train.iter().zip(rows.iter()).enumerate() {
            for test_window in row {
                test_window.check_bounds(axis.n_samples)?;
                if test_window.length != train_window.length {
                    return Err(DecodingError::config(format!(
                        "training window {} spans {} samples but one of its test windows spans {}",
                        i, train_window.length, test_window.length
                    )));
                }
            }
        }

        Ok(TestWindowGrid { rows, axis: *axis })
    }

    /// `round((t - t0) / dt)`, rejecting times outside the data range
    fn time_to_index(axis: &TimeAxis, t: f64, what: &str) -> DecodingResult<usize> {
        let tolerance = 1e-6 * axis.sampling_interval;
        if !t.is_finite() || t < axis.tmin - tolerance || t > axis.tmax() + tolerance {
            return Err(DecodingError::config(format!(
                "{} time {} s is outside the data range [{}, {}] s",
                what,
                t,
                axis.tmin,
                axis.tmax()
            )));
        }
        let index = ((t - axis.tmin) / axis.sampling_interval).round().max(0.0) as usize;
        Ok(index.min(axis.n_samples - 1))
    }

    /// Duration in seconds to a positive sample count
    fn duration_to_samples(axis: &TimeAxis, d: f64, what: &str) -> DecodingResult<usize> {
        let samples = (d / axis.sampling_interval).round();
        if !samples.is_finite() || samples < 1.0 {
            return Err(DecodingError::config(format!(
                "{} of {} s is shorter than one sample ({} s)",
                what, d, axis.sampling_interval
            )));
        }
        Ok(samples as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axis() -> TimeAxis {
        // 15 samples from -0.2 s at 20 Hz
        TimeAxis::new(15, -0.2, 0.05)
    }

    #[test]
    fn test_default_plan_one_window_per_sample() {
        let windows = TimeWindowPlanner::plan(&axis(), &WindowConfig::new()).unwrap();
        assert_eq!(windows.len(), 15);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(*w, Window::new(i, 1));
        }
        assert_relative_eq!(windows.times()[0], -0.2);
    }

    #[test]
    fn test_length_and_step() {
        let config = WindowConfig::new().with_length(0.1);
        let windows = TimeWindowPlanner::plan(&axis(), &config).unwrap();
        assert_eq!(windows.len(), 14);
        assert_eq!(windows.windows()[13], Window::new(13, 2));

        let config = WindowConfig::new().with_step(0.1);
        let windows = TimeWindowPlanner::plan(&axis(), &config).unwrap();
        assert_eq!(windows.len(), 8);
        assert_eq!(windows.windows()[7].start, 14);
    }

    #[test]
    fn test_start_stop() {
        let config = WindowConfig::new().with_start(0.1).with_stop(0.25);
        let windows = TimeWindowPlanner::plan(&axis(), &config).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows.windows()[0].start, 6);
        assert_eq!(windows.windows()[3].start, 9);
    }

    #[test]
    fn test_windows_stay_in_bounds() {
        let ax = axis();
        for length in 1..=15 {
            for step in 1..=5 {
                let config = WindowConfig::new()
                    .with_length(length as f64 * 0.05)
                    .with_step(step as f64 * 0.05);
                let windows = TimeWindowPlanner::plan(&ax, &config).unwrap();
                assert!(windows.iter().all(|w| w.end() <= ax.n_samples));
            }
        }
    }

    #[test]
    fn test_start_before_data_is_rejected() {
        let config = WindowConfig::new().with_start(-0.5);
        let err = TimeWindowPlanner::plan(&axis(), &config).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_degenerate_and_oversized_windows() {
        let zero_step = WindowConfig::new().with_step(0.01);
        assert!(TimeWindowPlanner::plan(&axis(), &zero_step).is_err());

        let too_long = WindowConfig::new().with_length(1.0);
        assert!(TimeWindowPlanner::plan(&axis(), &too_long).is_err());

        let outside = WindowConfig::explicit(vec![Window::new(14, 2)]);
        assert!(TimeWindowPlanner::plan(&axis(), &outside).is_err());

        let huge_length = WindowConfig::new().with_length(1e30);
        assert!(TimeWindowPlanner::plan(&axis(), &huge_length)
            .unwrap_err()
            .is_configuration_error());
    }

    #[test]
    fn test_step_longer_than_span_gives_one_window() {
        for step in [1.0, 1e30] {
            let config = WindowConfig::new().with_step(step);
            let windows = TimeWindowPlanner::plan(&axis(), &config).unwrap();
            assert_eq!(windows.len(), 1);
            assert_eq!(windows.get(0).unwrap().start, 0);
        }

        let config = WindowConfig::new().with_length(0.5).with_step(1e30);
        let windows = TimeWindowPlanner::plan(&axis(), &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows.get(0).unwrap().end(), 10);
    }

    #[test]
    fn test_diagonal_tests() {
        let train = TimeWindowPlanner::plan(&axis(), &WindowConfig::new()).unwrap();
        let grid = TimeWindowPlanner::plan_tests(&train, &axis(), &TestWindows::Diagonal).unwrap();

        assert_eq!(grid.n_train(), train.len());
        for (i, w) in train.iter().enumerate() {
            assert_eq!(grid.row(i), &[*w]);
        }
    }

    #[test]
    fn test_all_tests_uniform_grid() {
        let train = TimeWindowPlanner::plan(&axis(), &WindowConfig::new()).unwrap();
        let grid = TimeWindowPlanner::plan_tests(&train, &axis(), &TestWindows::All).unwrap();
        assert!(grid.is_uniform());
        assert_eq!(grid.to_string(), "<TestWindows | n_windows: 15 * 15>");
    }

    #[test]
    fn test_mismatched_test_width() {
        let train = TimeWindowPlanner::plan(&axis(), &WindowConfig::new()).unwrap();
        let tests = TestWindows::Config(WindowConfig::new().with_length(0.1));
        let err = TimeWindowPlanner::plan_tests(&train, &axis(), &tests).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_parse_test_windows() {
        assert_eq!("diagonal".parse::<TestWindows>().unwrap(), TestWindows::Diagonal);
        assert!("hahahaha".parse::<TestWindows>().is_err());
    }

    #[test]
    fn test_display() {
        let windows = TimeWindowPlanner::plan(&axis(), &WindowConfig::new()).unwrap();
        assert_eq!(
            windows.to_string(),
            "<TimeWindows | start: -0.200000 s, stop: 0.500000 s, step: 0.050000 s, \
             length: 0.050000 s, n_windows: 15>"
        );
    }
}
