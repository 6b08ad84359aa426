//! Gravity/body separation of acceleration samples.
//!
//! Impulsive noise is removed with a per-axis median filter. The slowly
//! varying gravity component is isolated with a low-pass filter and shifted
//! left by the filter delay; body acceleration is what remains.

use crate::config::SeparationConfig;
use crate::core::error::ModelError;
use crate::core::filter::{median_filter, ChebyshevLowPass, LowPassSpec};
use crate::ingest::Sample;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gravity and body features of a buffer of samples, time aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparatedFeatures {
    pub gravity: Vec<[f64; 3]>,
    pub body: Vec<[f64; 3]>,
}

impl SeparatedFeatures {
    pub fn len(&self) -> usize {
        self.gravity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gravity.is_empty()
    }

    /// Keep only the first `len` rows of both features.
    pub fn truncate(&mut self, len: usize) {
        self.gravity.truncate(len);
        self.body.truncate(len);
    }
}

/// Splits acceleration into gravity and body components.
#[derive(Debug, Clone)]
pub struct SignalSeparator {
    median_order: usize,
    lowpass: ChebyshevLowPass,
    delay: usize,
}

impl SignalSeparator {
    pub fn new(config: &SeparationConfig) -> Result<Self, ModelError> {
        let lowpass = ChebyshevLowPass::design(&LowPassSpec::from(config))?;
        debug!(
            order = lowpass.order(),
            dc_group_delay = lowpass.dc_group_delay(),
            delay = config.filter_delay,
            "Designed gravity low-pass filter"
        );

        Ok(Self {
            median_order: config.median_order,
            lowpass,
            delay: config.filter_delay,
        })
    }

    /// Samples consumed by the delay compensation.
    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn lowpass(&self) -> &ChebyshevLowPass {
        &self.lowpass
    }

    /// Separate `samples` into `samples.len() - delay` gravity and body rows.
    ///
    /// Buffers no longer than the delay produce empty features.
    pub fn separate(&self, samples: &[Sample]) -> SeparatedFeatures {
        if samples.len() <= self.delay {
            return SeparatedFeatures::default();
        }
        let len = samples.len() - self.delay;

        let mut gravity = vec![[0.0; 3]; len];
        let mut body = vec![[0.0; 3]; len];

        for axis in 0..3 {
            let raw: Vec<f64> = samples.iter().map(|s| s.as_array()[axis]).collect();
            let cleaned = median_filter(&raw, self.median_order);
            let smooth = self.lowpass.filter(&cleaned);

            for i in 0..len {
                let g = smooth[i + self.delay];
                gravity[i][axis] = g;
                body[i][axis] = cleaned[i] - g;
            }
        }

        SeparatedFeatures { gravity, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separator() -> SignalSeparator {
        SignalSeparator::new(&SeparationConfig::default()).unwrap()
    }

    #[test]
    fn test_output_length() {
        let separator = separator();
        let samples = vec![Sample::default(); 100];
        let features = separator.separate(&samples);

        assert_eq!(features.gravity.len(), 36);
        assert_eq!(features.body.len(), 36);
    }

    #[test]
    fn test_underfilled_buffer_is_empty() {
        let separator = separator();
        assert!(separator.separate(&vec![Sample::default(); 64]).is_empty());
        assert!(separator.separate(&vec![Sample::default(); 10]).is_empty());
        assert!(separator.separate(&[]).is_empty());
    }

    #[test]
    fn test_constant_signal_is_all_gravity() {
        let separator = separator();
        let constant = Sample::new(0.5, -3.0, 9.81);
        let features = separator.separate(&vec![constant; 1200]);

        // Past the filter transient
        for i in 1000..features.len() {
            for axis in 0..3 {
                let expected = constant.as_array()[axis];
                assert!((features.gravity[i][axis] - expected).abs() < 1e-2);
                assert!(features.body[i][axis].abs() < 1e-2);
            }
        }
    }

    #[test]
    fn test_body_carries_fast_motion() {
        let separator = separator();
        // 2 Hz oscillation on x on top of gravity on z
        let samples: Vec<Sample> = (0..1200)
            .map(|n| {
                let phase = 2.0 * std::f64::consts::PI * 2.0 * n as f64 / 32.0;
                Sample::new(phase.sin(), 0.0, 9.81)
            })
            .collect();
        let features = separator.separate(&samples);

        let tail = &features.body[900..];
        let peak = tail.iter().fold(0.0f64, |m, b| m.max(b[0].abs()));
        assert!(peak > 0.8, "body peak {peak}");
        for g in &features.gravity[900..] {
            assert!(g[0].abs() < 0.01);
        }
    }

    #[test]
    fn test_truncate_features() {
        let mut features = separator().separate(&vec![Sample::default(); 100]);
        features.truncate(10);
        assert_eq!(features.len(), 10);
        assert_eq!(features.body.len(), 10);
    }
}
