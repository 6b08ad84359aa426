//! Gaussian mixture models over `(time, x, y, z)` points and their EM training.
//!
//! Initialization comes from K-means. Expectation is carried out in log
//! space so that points far from every component still get well-defined
//! posteriors. Every covariance is re-inflated by a small multiple of the
//! identity after each update.

use crate::config::TrainingConfig;
use crate::core::dataset::Dataset;
use crate::core::error::ModelError;
use crate::core::kmeans::{Clustering, KMeans};
use crate::core::linalg::{log_sum_exp, sample_covariance, GaussianDensity};
use nalgebra::{Matrix4, Vector4};
use rand::Rng;
use tracing::{debug, warn};

/// One weighted component of a mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    pub prior: f64,
    pub mean: Vector4<f64>,
    pub covariance: Matrix4<f64>,
}

/// A set of components whose priors sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
}

impl GaussianMixture {
    pub fn new(components: Vec<GaussianComponent>) -> Result<Self, ModelError> {
        if components.is_empty() {
            return Err(ModelError::InsufficientData(
                "a mixture needs at least one component".to_string(),
            ));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn priors_sum(&self) -> f64 {
        self.components.iter().map(|c| c.prior).sum()
    }

    /// Mean log-likelihood of `points`, with each density floored at the
    /// smallest positive `f64`.
    pub fn log_likelihood(&self, points: &[Vector4<f64>]) -> Result<f64, ModelError> {
        let weighted = WeightedDensities::new(self)?;
        let mut scratch = vec![0.0; self.len()];
        let total: f64 = points
            .iter()
            .map(|p| floored(weighted.log_joint(p, &mut scratch)))
            .sum();
        Ok(total / points.len().max(1) as f64)
    }
}

/// `ln(prior)` and density of every live component.
struct WeightedDensities {
    entries: Vec<Option<(f64, GaussianDensity)>>,
}

impl WeightedDensities {
    fn new(mixture: &GaussianMixture) -> Result<Self, ModelError> {
        let entries = mixture
            .components
            .iter()
            .map(|c| {
                if c.prior > 0.0 {
                    GaussianDensity::new(c.mean, c.covariance).map(|d| Some((c.prior.ln(), d)))
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Fill `out` with `ln(prior_k * N(x; k))` and return their log-sum.
    fn log_joint(&self, x: &Vector4<f64>, out: &mut [f64]) -> f64 {
        for (slot, entry) in out.iter_mut().zip(&self.entries) {
            *slot = match entry {
                Some((log_prior, density)) => log_prior + density.ln_pdf(x),
                None => f64::NEG_INFINITY,
            };
        }
        log_sum_exp(out)
    }
}

fn floored(log_density: f64) -> f64 {
    log_density.max(f64::MIN_POSITIVE.ln())
}

fn relative_change(current: f64, previous: f64) -> f64 {
    ((current - previous) / previous.abs().max(f64::MIN_POSITIVE)).abs()
}

/// Outcome of one EM run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub mixture: GaussianMixture,
    /// Number of M-steps performed
    pub iterations: usize,
    /// Mean log-likelihood of the returned mixture
    pub log_likelihood: f64,
    pub converged: bool,
    /// Mean log-likelihood before every M-step and of the final mixture
    pub history: Vec<f64>,
}

/// Expectation-Maximization trainer.
#[derive(Debug, Clone)]
pub struct GmmTrainer {
    regularization: f64,
    loglik_threshold: f64,
    max_iterations: usize,
    require_convergence: bool,
    kmeans_restarts: usize,
}

impl GmmTrainer {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            regularization: config.covariance_regularization,
            loglik_threshold: config.loglik_threshold,
            max_iterations: config.max_iterations,
            require_convergence: config.require_convergence,
            kmeans_restarts: 3,
        }
    }

    pub fn with_kmeans_restarts(mut self, restarts: usize) -> Self {
        self.kmeans_restarts = restarts.max(1);
        self
    }

    /// Mixture from a K-means partition: population fractions, centroids,
    /// and regularized cluster covariances.
    pub fn initialize(
        &self,
        dataset: &Dataset,
        clustering: &Clustering,
    ) -> Result<GaussianMixture, ModelError> {
        let n = dataset.len() as f64;
        let components = clustering
            .members(dataset.points())
            .into_iter()
            .zip(&clustering.centroids)
            .map(|(members, centroid)| {
                let owned: Vec<Vector4<f64>> = members.into_iter().copied().collect();
                let (_, covariance) = sample_covariance(&owned);
                GaussianComponent {
                    prior: owned.len() as f64 / n,
                    mean: *centroid,
                    covariance: covariance + Matrix4::identity() * self.regularization,
                }
            })
            .collect();
        GaussianMixture::new(components)
    }

    /// Initialize with K-means and run EM on `dataset`.
    pub fn fit<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        k: usize,
        rng: &mut R,
    ) -> Result<TrainingReport, ModelError> {
        let clustering = KMeans::new(k)
            .with_restarts(self.kmeans_restarts)
            .fit(dataset.points(), rng)?;
        let initial = self.initialize(dataset, &clustering)?;
        self.train_from(dataset, initial)
    }

    /// Run EM starting from `initial`.
    pub fn train_from(
        &self,
        dataset: &Dataset,
        initial: GaussianMixture,
    ) -> Result<TrainingReport, ModelError> {
        let points = dataset.points();
        let k = initial.len();
        let mut mixture = initial;
        let mut posteriors = vec![0.0; points.len() * k];
        let mut history: Vec<f64> = Vec::new();
        let mut iterations = 0;
        let mut converged = false;
        let mut last_change = f64::INFINITY;

        loop {
            let log_likelihood = self.expectation(points, &mixture, &mut posteriors)?;
            if let Some(&previous) = history.last() {
                last_change = relative_change(log_likelihood, previous);
            }
            history.push(log_likelihood);

            if last_change < self.loglik_threshold {
                converged = true;
                break;
            }
            if iterations >= self.max_iterations {
                break;
            }

            mixture = self.maximization(points, &mixture, &posteriors);
            iterations += 1;
            debug!(iteration = iterations, log_likelihood, "EM step");
        }

        let log_likelihood = history.last().copied().unwrap_or(f64::NEG_INFINITY);

        if !converged {
            warn!(
                iterations,
                relative_change = last_change,
                "EM stopped at the iteration cap before converging"
            );
            if self.require_convergence {
                return Err(ModelError::NotConverged {
                    iterations,
                    relative_change: last_change,
                });
            }
        }

        Ok(TrainingReport {
            mixture,
            iterations,
            log_likelihood,
            converged,
            history,
        })
    }

    /// Posteriors into `posteriors` (row-major, one row per point); returns
    /// the mean floored log-likelihood.
    fn expectation(
        &self,
        points: &[Vector4<f64>],
        mixture: &GaussianMixture,
        posteriors: &mut [f64],
    ) -> Result<f64, ModelError> {
        let weighted = WeightedDensities::new(mixture)?;
        let k = mixture.len();
        let mut total = 0.0;

        for (point, row) in points.iter().zip(posteriors.chunks_mut(k)) {
            let log_norm = weighted.log_joint(point, row);
            total += floored(log_norm);

            if log_norm.is_finite() {
                row.iter_mut().for_each(|v| *v = (*v - log_norm).exp());
            } else {
                // No live component reaches this point; share it evenly
                let live = weighted.entries.iter().filter(|e| e.is_some()).count().max(1);
                for (v, entry) in row.iter_mut().zip(&weighted.entries) {
                    *v = if entry.is_some() { 1.0 / live as f64 } else { 0.0 };
                }
            }
        }

        Ok(total / points.len().max(1) as f64)
    }

    fn maximization(
        &self,
        points: &[Vector4<f64>],
        mixture: &GaussianMixture,
        posteriors: &[f64],
    ) -> GaussianMixture {
        let k = mixture.len();
        let n = points.len() as f64;

        let components = mixture
            .components
            .iter()
            .enumerate()
            .map(|(j, previous)| {
                let weights = posteriors.iter().skip(j).step_by(k);
                let mass: f64 = weights.clone().sum();
                if mass <= 0.0 {
                    return GaussianComponent {
                        prior: 0.0,
                        ..previous.clone()
                    };
                }

                let mean = points
                    .iter()
                    .zip(weights.clone())
                    .fold(Vector4::zeros(), |acc, (p, w)| acc + p * *w)
                    / mass;
                let scatter = points
                    .iter()
                    .zip(weights)
                    .fold(Matrix4::zeros(), |acc, (p, w)| {
                        let d = p - mean;
                        acc + d * d.transpose() * *w
                    });

                GaussianComponent {
                    prior: mass / n,
                    mean,
                    covariance: scatter / mass + Matrix4::identity() * self.regularization,
                }
            })
            .collect();

        GaussianMixture { components }
    }
}
