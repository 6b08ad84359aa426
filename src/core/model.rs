//! Per-class motion models and the builder that trains them.

use crate::config::Config;
use crate::core::dataset::{Dataset, DatasetBuilder};
use crate::core::error::ModelError;
use crate::core::gmm::GmmTrainer;
use crate::core::gmr::{query_times, ExpectedCurve, GaussianMixtureRegressor};
use crate::core::linalg::squared_mahalanobis3;
use crate::core::selector::ClusterCountSelector;
use crate::core::separator::{SeparatedFeatures, SignalSeparator};
use crate::ingest::Trial;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Expected gravity and body curves of one motion class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    pub name: String,
    pub gravity: ExpectedCurve,
    pub body: ExpectedCurve,
    /// Distance at which the possibility of this class reaches zero
    pub threshold: f64,
}

impl ClassModel {
    /// Number of feature rows compared against the curves.
    pub fn curve_len(&self) -> usize {
        self.gravity.len()
    }

    /// Mean of the gravity and body distances of the first `curve_len` rows.
    pub fn distance(&self, features: &SeparatedFeatures) -> Result<f64, ModelError> {
        let len = self.curve_len();
        if features.len() < len {
            return Err(ModelError::Mismatch(format!(
                "class '{}' needs {len} feature rows, got {}",
                self.name,
                features.len()
            )));
        }
        let gravity = mahalanobis_distance(&self.gravity, &features.gravity[..len])?;
        let body = mahalanobis_distance(&self.body, &features.body[..len])?;
        Ok((gravity + body) / 2.0)
    }

    fn validate(&self) -> Result<(), ModelError> {
        self.gravity.validate()?;
        self.body.validate()?;
        if self.gravity.len() != self.body.len() {
            return Err(ModelError::Mismatch(format!(
                "class '{}' has {} gravity and {} body points",
                self.name,
                self.gravity.len(),
                self.body.len()
            )));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ModelError::Mismatch(format!(
                "class '{}' has threshold {}",
                self.name, self.threshold
            )));
        }
        Ok(())
    }
}

/// Mean per-point squared Mahalanobis distance of `rows` from a curve of the
/// same length.
pub fn mahalanobis_distance(curve: &ExpectedCurve, rows: &[[f64; 3]]) -> Result<f64, ModelError> {
    if rows.len() != curve.len() || rows.is_empty() {
        return Err(ModelError::Mismatch(format!(
            "{} rows against a curve of {} points",
            rows.len(),
            curve.len()
        )));
    }

    let total = rows
        .iter()
        .enumerate()
        .map(|(i, row)| squared_mahalanobis3(&Vector3::from(*row), &curve.mean_at(i), &curve.covariance_at(i)))
        .sum::<Result<f64, ModelError>>()?;
    Ok(total / rows.len() as f64)
}

/// Acceptance threshold from a synthetic trial lying `factor` standard
/// deviations from both curves, away from zero on every axis.
///
/// Distances are squared, so a curve with uncorrelated axes gives
/// `3 * factor^2`.
pub fn compute_threshold(
    gravity: &ExpectedCurve,
    body: &ExpectedCurve,
    factor: f64,
) -> Result<f64, ModelError> {
    let mut total = 0.0;
    let mut count = 0usize;

    for curve in [gravity, body] {
        for i in 0..curve.len() {
            let mean = curve.mean_at(i);
            let sigma = curve.std_dev_at(i);
            let sign = mean.map(|v| if v < 0.0 { -1.0 } else { 1.0 });
            let admissible = mean + sigma.component_mul(&sign) * factor;
            total += squared_mahalanobis3(&admissible, &mean, &curve.covariance_at(i))?;
            count += 1;
        }
    }

    if count == 0 {
        return Err(ModelError::InsufficientData("empty curves".to_string()));
    }
    Ok(total / count as f64)
}

/// All known classes with the window geometry they require.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassModelSet {
    models: Vec<ClassModel>,
    filter_delay: usize,
    window_size: usize,
}

impl ClassModelSet {
    pub fn new(models: Vec<ClassModel>, filter_delay: usize) -> Result<Self, ModelError> {
        if models.is_empty() {
            return Err(ModelError::InsufficientData("no class models".to_string()));
        }
        for (i, model) in models.iter().enumerate() {
            model.validate()?;
            if models[..i].iter().any(|m| m.name == model.name) {
                return Err(ModelError::Mismatch(format!("duplicate class '{}'", model.name)));
            }
        }

        let longest = models.iter().map(ClassModel::curve_len).max().unwrap_or(0);
        Ok(Self {
            models,
            filter_delay,
            window_size: longest + filter_delay,
        })
    }

    pub fn models(&self) -> &[ClassModel] {
        &self.models
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ClassModel> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.models.iter().map(|m| m.threshold).collect()
    }

    pub fn filter_delay(&self) -> usize {
        self.filter_delay
    }

    /// Samples needed before classification can start.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn into_models(self) -> Vec<ClassModel> {
        self.models
    }
}

/// How one feature curve was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDiagnostics {
    pub components: usize,
    pub selection_converged: bool,
    pub fitness: Vec<(usize, f64)>,
    pub em_iterations: usize,
    pub em_converged: bool,
    pub log_likelihood: f64,
}

/// Training summary of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDiagnostics {
    pub class: String,
    pub trials: usize,
    pub trial_len: usize,
    pub gravity: FeatureDiagnostics,
    pub body: FeatureDiagnostics,
    pub threshold: f64,
}

impl BuildDiagnostics {
    pub fn converged(&self) -> bool {
        self.gravity.em_converged && self.body.em_converged
    }
}

#[derive(Debug, Clone)]
pub struct TrainedClass {
    pub model: ClassModel,
    pub diagnostics: BuildDiagnostics,
}

/// Every class of a corpus, trained.
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub models: ClassModelSet,
    pub diagnostics: Vec<BuildDiagnostics>,
}

/// Trains class models from recorded trials.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    separator: SignalSeparator,
    selector: ClusterCountSelector,
    trainer: GmmTrainer,
    threshold_factor: f64,
    seed: Option<u64>,
    parallel: bool,
}

impl ModelBuilder {
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        Ok(Self {
            separator: SignalSeparator::new(&config.separation)?,
            selector: ClusterCountSelector::new(&config.clustering),
            trainer: GmmTrainer::new(&config.training).with_kmeans_restarts(config.clustering.restarts),
            threshold_factor: config.threshold_factor,
            seed: config.seed,
            parallel: config.parallel_training,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn separator(&self) -> &SignalSeparator {
        &self.separator
    }

    /// Train the model of one class.
    pub fn build<R: Rng + ?Sized>(
        &self,
        name: &str,
        trials: &[Trial],
        rng: &mut R,
    ) -> Result<TrainedClass, ModelError> {
        let datasets = DatasetBuilder::new(&self.separator).build(trials)?;
        let (gravity, gravity_diag) = self.model_feature(&datasets.gravity, rng)?;
        let (body, body_diag) = self.model_feature(&datasets.body, rng)?;
        let threshold = compute_threshold(&gravity, &body, self.threshold_factor)?;

        info!(
            class = name,
            trials = trials.len(),
            gravity_components = gravity_diag.components,
            body_components = body_diag.components,
            threshold,
            "Built class model"
        );

        let diagnostics = BuildDiagnostics {
            class: name.to_string(),
            trials: datasets.gravity.trial_count(),
            trial_len: datasets.gravity.trial_len(),
            gravity: gravity_diag,
            body: body_diag,
            threshold,
        };
        if !diagnostics.converged() {
            warn!(class = name, "Class model built from an unconverged mixture");
        }

        Ok(TrainedClass {
            model: ClassModel {
                name: name.to_string(),
                gravity,
                body,
                threshold,
            },
            diagnostics,
        })
    }

    fn model_feature<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<(ExpectedCurve, FeatureDiagnostics), ModelError> {
        let selection = self.selector.select(dataset, rng)?;
        let report = self.trainer.fit(dataset, selection.k, rng)?;
        let curve = GaussianMixtureRegressor::new(&report.mixture)?.regress(&query_times(dataset));

        let diagnostics = FeatureDiagnostics {
            components: selection.k,
            selection_converged: selection.converged,
            fitness: selection.fitness,
            em_iterations: report.iterations,
            em_converged: report.converged,
            log_likelihood: report.log_likelihood,
        };
        Ok((curve, diagnostics))
    }

    /// RNG of the class at `index`: derived from the seed, or from entropy.
    fn class_rng(&self, index: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }

    /// Train every class, keeping the input order.
    pub fn build_all(&self, classes: &[(String, Vec<Trial>)]) -> Result<TrainedModels, ModelError> {
        let results = if self.parallel && classes.len() > 1 {
            self.build_parallel(classes)
        } else {
            classes
                .iter()
                .enumerate()
                .map(|(index, (name, trials))| self.build(name, trials, &mut self.class_rng(index)))
                .collect()
        };

        let mut models = Vec::with_capacity(classes.len());
        let mut diagnostics = Vec::with_capacity(classes.len());
        for ((name, _), result) in classes.iter().zip(results) {
            let trained = result.map_err(|e| ModelError::Class {
                name: name.clone(),
                source: Box::new(e),
            })?;
            models.push(trained.model);
            diagnostics.push(trained.diagnostics);
        }

        Ok(TrainedModels {
            models: ClassModelSet::new(models, self.separator.delay())?,
            diagnostics,
        })
    }

    /// One thread per class; results come back over a channel.
    fn build_parallel(&self, classes: &[(String, Vec<Trial>)]) -> Vec<Result<TrainedClass, ModelError>> {
        let (sender, receiver) = crossbeam_channel::unbounded();

        std::thread::scope(|scope| {
            for (index, (name, trials)) in classes.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move || {
                    let mut rng = self.class_rng(index);
                    let result = self.build(name, trials, &mut rng);
                    // The receiver outlives the scope
                    let _ = sender.send((index, result));
                });
            }
        });
        drop(sender);

        let mut results: Vec<(usize, Result<TrainedClass, ModelError>)> = receiver.iter().collect();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}
