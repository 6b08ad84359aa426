//! Time-indexed feature datasets built from the trials of one class.

use crate::core::error::ModelError;
use crate::core::separator::SignalSeparator;
use crate::ingest::Trial;
use nalgebra::Vector4;

/// Points `(time index, x, y, z)` of one feature over all trials of a class.
///
/// Every trial contributes `trial_len` points with time indices `1..=trial_len`.
#[derive(Debug, Clone)]
pub struct Dataset {
    points: Vec<Vector4<f64>>,
    trial_count: usize,
    trial_len: usize,
}

impl Dataset {
    /// Concatenate equally long feature trials, restarting the time index per trial.
    pub fn from_feature_trials(trials: &[Vec<[f64; 3]>]) -> Result<Self, ModelError> {
        let trial_len = trials.first().map(Vec::len).unwrap_or(0);
        if trial_len == 0 {
            return Err(ModelError::InsufficientData(
                "a dataset needs at least one non-empty trial".to_string(),
            ));
        }
        if let Some(index) = trials.iter().position(|t| t.len() != trial_len) {
            return Err(ModelError::InvalidTrial {
                index,
                reason: format!("length {} differs from {trial_len}", trials[index].len()),
            });
        }

        let mut points = Vec::with_capacity(trials.len() * trial_len);
        for trial in trials {
            for (i, row) in trial.iter().enumerate() {
                points.push(Vector4::new((i + 1) as f64, row[0], row[1], row[2]));
            }
        }

        Ok(Self {
            points,
            trial_count: trials.len(),
            trial_len,
        })
    }

    /// Wrap already assembled points. Used for synthetic data.
    pub fn from_points(points: Vec<Vector4<f64>>) -> Result<Self, ModelError> {
        if points.is_empty() {
            return Err(ModelError::InsufficientData("no points".to_string()));
        }
        let trial_len = points.len();
        Ok(Self {
            points,
            trial_count: 1,
            trial_len,
        })
    }

    pub fn points(&self) -> &[Vector4<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    pub fn trial_len(&self) -> usize {
        self.trial_len
    }

    /// Smallest time index in the dataset.
    pub fn min_time(&self) -> f64 {
        self.points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min)
    }

    /// Largest time index in the dataset.
    pub fn max_time(&self) -> f64 {
        self.points.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Gravity and body datasets of one class.
#[derive(Debug, Clone)]
pub struct ClassDatasets {
    pub gravity: Dataset,
    pub body: Dataset,
}

/// Decomposes whole trials and assembles the class datasets.
pub struct DatasetBuilder<'a> {
    separator: &'a SignalSeparator,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(separator: &'a SignalSeparator) -> Self {
        Self { separator }
    }

    /// Build gravity and body datasets, truncating every trial to the shortest one.
    pub fn build(&self, trials: &[Trial]) -> Result<ClassDatasets, ModelError> {
        if trials.is_empty() {
            return Err(ModelError::InsufficientData("no modeling trials".to_string()));
        }

        let mut gravity = Vec::with_capacity(trials.len());
        let mut body = Vec::with_capacity(trials.len());

        for (index, trial) in trials.iter().enumerate() {
            if let Some(bad) = trial.samples.iter().position(|s| !s.is_finite()) {
                return Err(ModelError::InvalidTrial {
                    index,
                    reason: format!("non-finite sample at position {bad}"),
                });
            }
            if trial.len() <= self.separator.delay() {
                return Err(ModelError::InvalidTrial {
                    index,
                    reason: format!(
                        "{} samples do not exceed the filter delay of {}",
                        trial.len(),
                        self.separator.delay()
                    ),
                });
            }

            let features = self.separator.separate(&trial.samples);
            gravity.push(features.gravity);
            body.push(features.body);
        }

        // Every trial contributes the same number of rows
        let short = gravity.iter().map(Vec::len).min().unwrap_or(0);
        for rows in gravity.iter_mut().chain(body.iter_mut()) {
            rows.truncate(short);
        }

        Ok(ClassDatasets {
            gravity: Dataset::from_feature_trials(&gravity)?,
            body: Dataset::from_feature_trials(&body)?,
        })
    }
}
