//! Streaming classification of live samples against every known class.

use crate::core::error::ModelError;
use crate::core::model::ClassModelSet;
use crate::core::separator::SignalSeparator;
use crate::core::windowing::SampleWindow;
use crate::ingest::Sample;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Threshold-normalized score `max(0, 1 - d/τ)` in `[0, 1]`.
///
/// Non-finite distances and non-positive thresholds score zero.
pub fn possibility(distance: f64, threshold: f64) -> f64 {
    if !distance.is_finite() || threshold <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / threshold).clamp(0.0, 1.0)
}

/// Lifecycle of a stream. `Full` is terminal until a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Filling,
    Full,
}

/// Classifies one stream of samples.
pub struct StreamClassifier {
    models: Arc<ClassModelSet>,
    separator: SignalSeparator,
    window: SampleWindow,
    state: StreamState,
    distances: Vec<f64>,
    possibilities: Vec<f64>,
}

impl StreamClassifier {
    pub fn new(models: Arc<ClassModelSet>, separator: SignalSeparator) -> Result<Self, ModelError> {
        if separator.delay() != models.filter_delay() {
            return Err(ModelError::Mismatch(format!(
                "separator delay {} differs from the model delay {}",
                separator.delay(),
                models.filter_delay()
            )));
        }

        let count = models.len();
        Ok(Self {
            window: SampleWindow::new(models.window_size()),
            models,
            separator,
            state: StreamState::Filling,
            distances: vec![f64::INFINITY; count],
            possibilities: vec![0.0; count],
        })
    }

    /// Feed one sample and return the possibility of every class, in model order.
    pub fn push(&mut self, sample: Sample) -> Result<Vec<f64>, ModelError> {
        self.window.push(sample);

        if self.state == StreamState::Filling {
            if !self.window.is_full() {
                return Ok(self.possibilities.clone());
            }
            debug!(window_size = self.window.capacity(), "Window full, classifying");
            self.state = StreamState::Full;
        }

        let features = self.separator.separate(self.window.samples());
        let distances = self
            .models
            .iter()
            .map(|model| model.distance(&features))
            .collect::<Result<Vec<f64>, ModelError>>()?;

        // Scores change only once every class has a distance
        for ((model, distance), p) in self.models.iter().zip(&distances).zip(self.possibilities.iter_mut()) {
            *p = possibility(*distance, model.threshold);
        }
        self.distances = distances;

        Ok(self.possibilities.clone())
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn models(&self) -> &ClassModelSet {
        &self.models
    }

    /// Distances of the latest classified window; infinite before the first.
    pub fn last_distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn last_possibilities(&self) -> &[f64] {
        &self.possibilities
    }

    /// Class with the highest positive possibility, if any.
    pub fn best_match(&self) -> Option<(&str, f64)> {
        self.models
            .iter()
            .zip(&self.possibilities)
            .filter(|(_, p)| **p > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(model, &p)| (model.name.as_str(), p))
    }

    /// Drop buffered samples and start filling again.
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = StreamState::Filling;
        self.distances.iter_mut().for_each(|d| *d = f64::INFINITY);
        self.possibilities.iter_mut().for_each(|p| *p = 0.0);
    }
}
