//! Median and Chebyshev Type I low-pass filters.
//!
//! The low-pass filter is designed from a passband/stopband specification:
//! minimum order, analog prototype poles, bilinear transform with a
//! prewarped passband edge. It runs as a cascade of second-order sections
//! because very low cutoffs make a single direct-form polynomial unstable.

use crate::config::SeparationConfig;
use crate::core::error::ModelError;
use nalgebra::Complex;
use std::f64::consts::PI;

/// Sliding median of odd or even `order` with zero-padded edges.
///
/// Output has the same length as the input.
pub fn median_filter(signal: &[f64], order: usize) -> Vec<f64> {
    if order <= 1 || signal.is_empty() {
        return signal.to_vec();
    }

    let before = (order - 1) / 2;
    let mut window = vec![0.0; order];

    (0..signal.len())
        .map(|i| {
            for (slot, value) in window.iter_mut().enumerate() {
                // Position in the signal of this window slot
                let pos = i as isize + slot as isize - before as isize;
                *value = if pos < 0 || pos as usize >= signal.len() {
                    0.0
                } else {
                    signal[pos as usize]
                };
            }
            window.sort_by(|a, b| a.total_cmp(b));
            if order % 2 == 1 {
                window[order / 2]
            } else {
                0.5 * (window[order / 2 - 1] + window[order / 2])
            }
        })
        .collect()
}

/// Design parameters of a low-pass filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPassSpec {
    pub sample_rate_hz: f64,
    pub passband_hz: f64,
    pub stopband_hz: f64,
    pub passband_ripple_db: f64,
    pub stopband_attenuation_db: f64,
}

impl From<&SeparationConfig> for LowPassSpec {
    fn from(config: &SeparationConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz,
            passband_hz: config.passband_hz,
            stopband_hz: config.stopband_hz,
            passband_ripple_db: config.passband_ripple_db,
            stopband_attenuation_db: config.stopband_attenuation_db,
        }
    }
}

/// One second-order section, `a[0]` normalized to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Group delay at DC in samples.
    fn dc_group_delay(&self) -> f64 {
        let moment = |c: &[f64; 3]| (c[1] + 2.0 * c[2]) / c.iter().sum::<f64>();
        moment(&self.b) - moment(&self.a)
    }
}

/// Chebyshev Type I low-pass filter as cascaded biquads.
#[derive(Debug, Clone)]
pub struct ChebyshevLowPass {
    order: usize,
    sections: Vec<Biquad>,
    gain: f64,
}

impl ChebyshevLowPass {
    /// Design the minimum-order filter meeting `spec`.
    pub fn design(spec: &LowPassSpec) -> Result<Self, ModelError> {
        let nyquist = spec.sample_rate_hz / 2.0;
        if !(spec.passband_hz > 0.0 && spec.passband_hz < spec.stopband_hz && spec.stopband_hz < nyquist) {
            return Err(ModelError::InvalidFilter(format!(
                "need 0 < passband ({}) < stopband ({}) < nyquist ({nyquist})",
                spec.passband_hz, spec.stopband_hz
            )));
        }
        if spec.passband_ripple_db <= 0.0 || spec.stopband_attenuation_db <= spec.passband_ripple_db {
            return Err(ModelError::InvalidFilter(
                "ripple must be positive and below the stopband attenuation".to_string(),
            ));
        }

        // Prewarped analog edges for a bilinear transform with unit constant
        let wp = (PI * spec.passband_hz / spec.sample_rate_hz).tan();
        let ws = (PI * spec.stopband_hz / spec.sample_rate_hz).tan();

        let eps2 = 10f64.powf(spec.passband_ripple_db / 10.0) - 1.0;
        let stop = 10f64.powf(spec.stopband_attenuation_db / 10.0) - 1.0;
        let order = ((stop / eps2).sqrt().acosh() / (ws / wp).acosh()).ceil().max(1.0) as usize;

        Ok(Self::from_order(order, eps2.sqrt(), wp))
    }

    /// Build the filter of a given order, ripple factor and prewarped edge.
    fn from_order(order: usize, eps: f64, wp: f64) -> Self {
        let mu = (1.0 / eps).asinh() / order as f64;
        let (sinh_mu, cosh_mu) = (mu.sinh(), mu.cosh());

        let analog_pole = |k: usize| {
            let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
            Complex::new(-sinh_mu * theta.sin(), cosh_mu * theta.cos()) * wp
        };
        let bilinear = |p: Complex<f64>| (Complex::new(1.0, 0.0) + p) / (Complex::new(1.0, 0.0) - p);

        let mut sections = Vec::with_capacity((order + 1) / 2);

        // Poles k and order-1-k are conjugates
        for k in 0..order / 2 {
            let z = bilinear(analog_pole(k));
            let a = [1.0, -2.0 * z.re, z.norm_sqr()];
            let scale = a.iter().sum::<f64>() / 4.0;
            sections.push(Biquad {
                b: [scale, 2.0 * scale, scale],
                a,
            });
        }

        if order % 2 == 1 {
            let z = bilinear(analog_pole(order / 2)).re;
            let scale = (1.0 - z) / 2.0;
            sections.push(Biquad {
                b: [scale, scale, 0.0],
                a: [1.0, -z, 0.0],
            });
        }

        let gain = if order % 2 == 0 {
            1.0 / (1.0 + eps * eps).sqrt()
        } else {
            1.0
        };

        Self {
            order,
            sections,
            gain,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f64 {
        self.gain * self.sections.iter().map(Biquad::dc_gain).product::<f64>()
    }

    /// Group delay at 0 Hz in samples.
    pub fn dc_group_delay(&self) -> f64 {
        self.sections.iter().map(Biquad::dc_group_delay).sum()
    }

    /// Filter a signal starting from rest.
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> = signal.iter().map(|v| v * self.gain).collect();

        for section in &self.sections {
            // Transposed direct form II
            let (mut s1, mut s2) = (0.0, 0.0);
            for value in out.iter_mut() {
                let x = *value;
                let y = section.b[0] * x + s1;
                s1 = section.b[1] * x - section.a[1] * y + s2;
                s2 = section.b[2] * x - section.a[2] * y;
                *value = y;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> ChebyshevLowPass {
        ChebyshevLowPass::design(&LowPassSpec::from(&SeparationConfig::default())).unwrap()
    }

    #[test]
    fn test_median_filter_removes_spike() {
        let signal = vec![1.0, 1.0, 9.0, 1.0, 1.0];
        assert_eq!(median_filter(&signal, 3), vec![1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_median_filter_zero_padding() {
        let signal = vec![5.0, 2.0, 7.0];
        // Edges see a padded zero
        assert_eq!(median_filter(&signal, 3), vec![2.0, 5.0, 2.0]);
        assert_eq!(median_filter(&signal, 1), signal);
    }

    #[test]
    fn test_default_design_order() {
        let filter = default_filter();
        assert_eq!(filter.order(), 6);
        assert_eq!(filter.sections().len(), 3);
    }

    #[test]
    fn test_dc_gain_matches_ripple_convention() {
        let filter = default_filter();
        let eps2 = 10f64.powf(0.001 / 10.0) - 1.0;
        assert!((filter.dc_gain() - 1.0 / (1.0 + eps2).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_dc_group_delay_near_configured_delay() {
        let delay = default_filter().dc_group_delay();
        assert!(delay > 60.0 && delay < 70.0, "group delay {delay}");
    }

    #[test]
    fn test_sections_are_stable() {
        for section in default_filter().sections() {
            // Pole radius below one for a second-order section
            assert!(section.a[2] < 1.0);
            assert!(section.a[1].abs() < 1.0 + section.a[2]);
        }
    }

    #[test]
    fn test_step_response_settles() {
        let filter = default_filter();
        let out = filter.filter(&vec![1.0; 1500]);
        let settled = out[1400];
        assert!((settled - filter.dc_gain()).abs() < 1e-6);
    }

    #[test]
    fn test_high_frequency_rejected() {
        let filter = default_filter();
        // 4 Hz tone at 32 Hz sampling, well inside the stopband
        let tone: Vec<f64> = (0..2000)
            .map(|n| (2.0 * PI * 4.0 * n as f64 / 32.0).sin())
            .collect();
        let out = filter.filter(&tone);
        let peak = out[1000..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 1e-4, "residual {peak}");
    }

    #[test]
    fn test_odd_order_design() {
        let filter = ChebyshevLowPass::from_order(3, 0.5, 0.1);
        assert_eq!(filter.sections().len(), 2);
        assert!((filter.dc_gain() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let mut spec = LowPassSpec::from(&SeparationConfig::default());
        spec.stopband_hz = 16.0;
        assert!(ChebyshevLowPass::design(&spec).is_err());
    }
}
