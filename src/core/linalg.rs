//! Small fixed-size linear algebra helpers.
//!
//! Densities and distances go through a Cholesky factorization so that no
//! explicit inverse or determinant is ever formed.

use crate::core::error::ModelError;
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// A 4-D normal density with a cached factorization.
#[derive(Debug, Clone)]
pub struct GaussianDensity {
    mean: Vector4<f64>,
    cholesky: nalgebra::Cholesky<f64, nalgebra::U4>,
    log_norm: f64,
}

impl GaussianDensity {
    pub fn new(mean: Vector4<f64>, covariance: Matrix4<f64>) -> Result<Self, ModelError> {
        let cholesky = covariance.cholesky().ok_or_else(|| {
            ModelError::SingularCovariance(format!("4x4 covariance with diagonal {:?}", covariance.diagonal().as_slice()))
        })?;
        let log_det = 2.0 * cholesky.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();

        Ok(Self {
            mean,
            cholesky,
            log_norm: -0.5 * (4.0 * LN_2PI + log_det),
        })
    }

    /// Natural log of the density at `x`.
    pub fn ln_pdf(&self, x: &Vector4<f64>) -> f64 {
        let centered = x - self.mean;
        let solved = self.cholesky.solve(&centered);
        self.log_norm - 0.5 * centered.dot(&solved)
    }
}

/// Squared Mahalanobis distance of `x` from a 3-D normal with the given
/// mean and covariance.
pub fn squared_mahalanobis3(
    x: &Vector3<f64>,
    mean: &Vector3<f64>,
    covariance: &Matrix3<f64>,
) -> Result<f64, ModelError> {
    let cholesky = covariance.cholesky().ok_or_else(|| {
        ModelError::SingularCovariance(format!("3x3 covariance with diagonal {:?}", covariance.diagonal().as_slice()))
    })?;
    let centered = x - mean;
    let solved = cholesky.solve(&centered);
    Ok(centered.dot(&solved).max(0.0))
}

/// `ln(sum(exp(values)))` without overflow. Empty or all `-inf` input gives `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Unbiased sample covariance of 4-D points. Fewer than two points give zeros.
pub fn sample_covariance(points: &[Vector4<f64>]) -> (Vector4<f64>, Matrix4<f64>) {
    let n = points.len();
    if n == 0 {
        return (Vector4::zeros(), Matrix4::zeros());
    }

    let mean = points.iter().fold(Vector4::zeros(), |acc, p| acc + p) / n as f64;
    if n < 2 {
        return (mean, Matrix4::zeros());
    }

    let scatter = points.iter().fold(Matrix4::zeros(), |acc, p| {
        let d = p - mean;
        acc + d * d.transpose()
    });
    (mean, scatter / (n - 1) as f64)
}

pub fn squared_distance(a: &Vector4<f64>, b: &Vector4<f64>) -> f64 {
    (a - b).norm_squared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_normal_density() {
        let density = GaussianDensity::new(Vector4::zeros(), Matrix4::identity()).unwrap();
        let expected = -2.0 * LN_2PI;
        assert!((density.ln_pdf(&Vector4::zeros()) - expected).abs() < 1e-12);

        let x = Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert!((density.ln_pdf(&x) - (expected - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_density_matches_diagonal_formula() {
        let variances = [2.0, 0.5, 3.0, 0.25];
        let cov = Matrix4::from_diagonal(&Vector4::from(variances));
        let mean = Vector4::new(1.0, -1.0, 0.5, 2.0);
        let density = GaussianDensity::new(mean, cov).unwrap();

        let x = Vector4::new(2.0, 0.0, 0.0, 1.5);
        let mut expected = 0.0;
        for i in 0..4 {
            let d = x[i] - mean[i];
            expected += -0.5 * (LN_2PI + variances[i].ln() + d * d / variances[i]);
        }
        assert!((density.ln_pdf(&x) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_singular_covariance_rejected() {
        let result = GaussianDensity::new(Vector4::zeros(), Matrix4::zeros());
        assert!(matches!(result, Err(ModelError::SingularCovariance(_))));
    }

    #[test]
    fn test_mahalanobis_scales_by_variance() {
        let cov = Matrix3::from_diagonal(&Vector3::new(4.0, 1.0, 9.0));
        let d2 = squared_mahalanobis3(&Vector3::new(2.0, 0.0, 0.0), &Vector3::zeros(), &cov).unwrap();
        assert!((d2 - 1.0).abs() < 1e-12);

        let d2 = squared_mahalanobis3(&Vector3::new(2.0, 1.0, 3.0), &Vector3::zeros(), &cov).unwrap();
        assert!((d2 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mahalanobis_follows_correlation() {
        // Deviations along the correlated direction cost less than across it
        let cov = Matrix3::new(1.0, 0.8, 0.0, 0.8, 1.0, 0.0, 0.0, 0.0, 1.0);
        let along = squared_mahalanobis3(&Vector3::new(1.0, 1.0, 0.0), &Vector3::zeros(), &cov).unwrap();
        let across = squared_mahalanobis3(&Vector3::new(1.0, -1.0, 0.0), &Vector3::zeros(), &cov).unwrap();
        assert!((along - 2.0 / 1.8).abs() < 1e-12);
        assert!((across - 2.0 / 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_log_sum_exp() {
        let values = [-1000.0, -1000.0];
        assert!((log_sum_exp(&values) - (-1000.0 + 2.0_f64.ln())).abs() < 1e-9);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, 0.0]), 0.0);
    }

    #[test]
    fn test_sample_covariance() {
        let points = vec![
            Vector4::new(1.0, 2.0, 0.0, 0.0),
            Vector4::new(3.0, 4.0, 0.0, 0.0),
        ];
        let (mean, cov) = sample_covariance(&points);
        assert_eq!(mean, Vector4::new(2.0, 3.0, 0.0, 0.0));
        assert!((cov[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((cov[(0, 1)] - 2.0).abs() < 1e-12);
        assert_eq!(cov[(2, 2)], 0.0);
    }
}
