//! Gaussian mixture regression: expected `(x, y, z)` and its covariance
//! conditioned on the time index.

use crate::core::dataset::Dataset;
use crate::core::error::ModelError;
use crate::core::gmm::GaussianMixture;
use crate::core::linalg::log_sum_exp;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// Expected value and covariance of a feature at a sequence of time points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedCurve {
    pub times: Vec<f64>,
    pub means: Vec<[f64; 3]>,
    pub covariances: Vec<[[f64; 3]; 3]>,
}

impl ExpectedCurve {
    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn mean_at(&self, index: usize) -> Vector3<f64> {
        Vector3::from(self.means[index])
    }

    pub fn covariance_at(&self, index: usize) -> Matrix3<f64> {
        let cov = &self.covariances[index];
        Matrix3::from_fn(|r, c| cov[r][c])
    }

    /// Standard deviation of every axis at `index`.
    pub fn std_dev_at(&self, index: usize) -> Vector3<f64> {
        let cov = &self.covariances[index];
        Vector3::new(cov[0][0].sqrt(), cov[1][1].sqrt(), cov[2][2].sqrt())
    }

    /// Check that all columns agree in length, hold finite values and that
    /// every covariance is positive-definite.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.is_empty() {
            return Err(ModelError::Mismatch("curve has no points".to_string()));
        }
        if self.times.len() != self.len() || self.covariances.len() != self.len() {
            return Err(ModelError::Mismatch(format!(
                "curve has {} times, {} means and {} covariances",
                self.times.len(),
                self.means.len(),
                self.covariances.len()
            )));
        }
        let finite = self.times.iter().all(|v| v.is_finite())
            && self.means.iter().flatten().all(|v| v.is_finite())
            && self.covariances.iter().flatten().flatten().all(|v| v.is_finite());
        if !finite {
            return Err(ModelError::Mismatch("curve holds non-finite values".to_string()));
        }
        if let Some(i) = (0..self.len()).find(|&i| self.covariance_at(i).cholesky().is_none()) {
            return Err(ModelError::SingularCovariance(format!(
                "curve covariance at point {i} is not positive-definite"
            )));
        }
        Ok(())
    }
}

/// Query times `linspace(min t, max t, ceil(max t))` of a dataset.
pub fn query_times(dataset: &Dataset) -> Vec<f64> {
    let (lo, hi) = (dataset.min_time(), dataset.max_time());
    let count = hi.ceil().max(1.0) as usize;
    if count == 1 {
        return vec![hi];
    }
    let step = (hi - lo) / (count - 1) as f64;
    (0..count).map(|i| lo + step * i as f64).collect()
}

/// Per-component pieces of the conditional distribution given time.
#[derive(Debug, Clone)]
struct ConditionalComponent {
    log_prior: f64,
    time: Normal,
    time_mean: f64,
    output_mean: Vector3<f64>,
    /// `Σ_ot Σ_tt⁻¹`
    gain: Vector3<f64>,
    /// `Σ_oo − Σ_ot Σ_tt⁻¹ Σ_to`
    covariance: Matrix3<f64>,
}

/// Regresses a trained mixture on its time dimension.
#[derive(Debug, Clone)]
pub struct GaussianMixtureRegressor {
    components: Vec<ConditionalComponent>,
}

impl GaussianMixtureRegressor {
    pub fn new(mixture: &GaussianMixture) -> Result<Self, ModelError> {
        let components = mixture
            .components()
            .iter()
            .filter(|c| c.prior > 0.0)
            .map(|c| {
                let var_t = c.covariance[(0, 0)];
                if !(var_t > 0.0) {
                    return Err(ModelError::SingularCovariance(format!(
                        "time variance {var_t} is not positive"
                    )));
                }
                let time = Normal::new(c.mean[0], var_t.sqrt())
                    .map_err(|e| ModelError::SingularCovariance(e.to_string()))?;

                let cross: Vector3<f64> = c.covariance.fixed_view::<3, 1>(1, 0).into_owned();
                let output: Matrix3<f64> = c.covariance.fixed_view::<3, 3>(1, 1).into_owned();
                let gain = cross / var_t;

                Ok(ConditionalComponent {
                    log_prior: c.prior.ln(),
                    time,
                    time_mean: c.mean[0],
                    output_mean: c.mean.fixed_rows::<3>(1).into_owned(),
                    gain,
                    covariance: output - gain * cross.transpose(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if components.is_empty() {
            return Err(ModelError::InsufficientData(
                "mixture has no component with positive prior".to_string(),
            ));
        }
        Ok(Self { components })
    }

    /// Expected curve at `times`.
    ///
    /// The covariance is `Σ β_k² · cov_k`, which ignores the spread between
    /// component means.
    pub fn regress(&self, times: &[f64]) -> ExpectedCurve {
        let mut log_beta = vec![0.0; self.components.len()];
        let mut means = Vec::with_capacity(times.len());
        let mut covariances = Vec::with_capacity(times.len());

        for &t in times {
            for (slot, c) in log_beta.iter_mut().zip(&self.components) {
                *slot = c.log_prior + c.time.ln_pdf(t);
            }
            let log_norm = log_sum_exp(&log_beta);

            let mut mean = Vector3::zeros();
            let mut covariance = Matrix3::zeros();
            for (lb, c) in log_beta.iter().zip(&self.components) {
                let beta = if log_norm.is_finite() {
                    (lb - log_norm).exp()
                } else {
                    1.0 / self.components.len() as f64
                };
                mean += (c.output_mean + c.gain * (t - c.time_mean)) * beta;
                covariance += c.covariance * (beta * beta);
            }

            means.push([mean[0], mean[1], mean[2]]);
            covariances.push([
                [covariance[(0, 0)], covariance[(0, 1)], covariance[(0, 2)]],
                [covariance[(1, 0)], covariance[(1, 1)], covariance[(1, 2)]],
                [covariance[(2, 0)], covariance[(2, 1)], covariance[(2, 2)]],
            ]);
        }

        ExpectedCurve {
            times: times.to_vec(),
            means,
            covariances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::core::gmm::GmmTrainer;
    use nalgebra::Vector4;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_single_component_is_least_squares() {
        let mut rng = StdRng::seed_from_u64(13);
        let points: Vec<Vector4<f64>> = (1..=50)
            .map(|t| {
                let t = t as f64;
                Vector4::new(
                    t,
                    2.0 * t + 1.0 + rng.gen_range(-3.0..3.0),
                    -0.5 * t + rng.gen_range(-1.0..1.0),
                    4.0 + rng.gen_range(-0.1..0.1),
                )
            })
            .collect();

        // Ordinary least squares slope and intercept of y on t
        let n = points.len() as f64;
        let mean_t = points.iter().map(|p| p[0]).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / n;
        let cov_ty: f64 = points.iter().map(|p| (p[0] - mean_t) * (p[1] - mean_y)).sum();
        let var_t: f64 = points.iter().map(|p| (p[0] - mean_t).powi(2)).sum();
        let slope = cov_ty / var_t;
        let intercept = mean_y - slope * mean_t;

        let dataset = Dataset::from_points(points).unwrap();
        let report = GmmTrainer::new(&TrainingConfig::default())
            .fit(&dataset, 1, &mut rng)
            .unwrap();
        let regressor = GaussianMixtureRegressor::new(&report.mixture).unwrap();
        let curve = regressor.regress(&[10.0, 40.0]);

        let fitted_slope = (curve.means[1][0] - curve.means[0][0]) / 30.0;
        assert!((fitted_slope - slope).abs() < 1e-3, "{fitted_slope} vs {slope}");
        assert!((curve.means[0][0] - (intercept + slope * 10.0)).abs() < 1e-3);

        // One component: β = 1 and the covariance is the conditional one
        assert_eq!(curve.covariances[0], curve.covariances[1]);
        assert!(curve.validate().is_ok());
    }

    #[test]
    fn test_components_blend_by_time() {
        let left = crate::core::gmm::GaussianComponent {
            prior: 0.5,
            mean: Vector4::new(0.0, -1.0, 0.0, 0.0),
            covariance: nalgebra::Matrix4::identity(),
        };
        let right = crate::core::gmm::GaussianComponent {
            prior: 0.5,
            mean: Vector4::new(100.0, 1.0, 0.0, 0.0),
            ..left.clone()
        };
        let mixture = GaussianMixture::new(vec![left, right]).unwrap();
        let curve = GaussianMixtureRegressor::new(&mixture)
            .unwrap()
            .regress(&[0.0, 50.0, 100.0]);

        assert!((curve.means[0][0] + 1.0).abs() < 1e-9);
        assert!(curve.means[1][0].abs() < 1e-9);
        assert!((curve.means[2][0] - 1.0).abs() < 1e-9);
        // Equal β of 0.5 at the midpoint
        assert!((curve.covariances[1][0][0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_far_query_does_not_produce_nan() {
        let mixture = GaussianMixture::new(vec![crate::core::gmm::GaussianComponent {
            prior: 1.0,
            mean: Vector4::zeros(),
            covariance: nalgebra::Matrix4::identity() * 1e-4,
        }])
        .unwrap();
        let curve = GaussianMixtureRegressor::new(&mixture)
            .unwrap()
            .regress(&[1e6]);
        assert!(curve.validate().is_ok());
    }

    #[test]
    fn test_query_times_span_dataset() {
        let trials = vec![vec![[0.0; 3]; 7], vec![[0.0; 3]; 7]];
        let dataset = Dataset::from_feature_trials(&trials).unwrap();
        assert_eq!(query_times(&dataset), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_curve_validation() {
        let mut curve = ExpectedCurve {
            times: vec![1.0, 2.0],
            means: vec![[0.0; 3]; 2],
            covariances: vec![[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]; 2],
        };
        assert!(curve.validate().is_ok());
        assert_eq!(curve.std_dev_at(1), Vector3::new(1.0, 1.0, 1.0));

        curve.covariances.pop();
        assert!(curve.validate().is_err());
    }

    #[test]
    fn test_curve_rejects_indefinite_covariance() {
        let mut curve = ExpectedCurve {
            times: vec![1.0, 2.0, 3.0],
            means: vec![[0.0; 3]; 3],
            covariances: vec![[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]; 3],
        };
        curve.covariances[2] = [[1.0, 2.0, 0.0], [2.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(matches!(curve.validate(), Err(ModelError::SingularCovariance(_))));

        curve.covariances[2] = [[0.0; 3]; 3];
        assert!(matches!(curve.validate(), Err(ModelError::SingularCovariance(_))));
    }
}
