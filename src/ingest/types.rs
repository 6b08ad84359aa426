//! Sample types for tri-axial accelerometer recordings.
//!
//! Raw recordings store each axis as a small unsigned code. Everything past
//! ingestion works on physical accelerations in m/s².

use serde::{Deserialize, Serialize};

/// Largest raw code emitted by the recording device.
pub const RAW_MAX: u8 = 63;

/// Physical magnitude (m/s²) mapped to the raw code extremes (±1.5 g).
pub const PHYSICAL_RANGE: f64 = 14.709;

/// One accelerometer reading as stored by the recording device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl RawSample {
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }
}

/// Linear mapping from raw codes to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleScale {
    /// Raw code corresponding to `+physical_range`
    pub raw_max: u8,
    /// Magnitude of the physical range in m/s²
    pub physical_range: f64,
}

impl Default for SampleScale {
    fn default() -> Self {
        Self {
            raw_max: RAW_MAX,
            physical_range: PHYSICAL_RANGE,
        }
    }
}

impl SampleScale {
    /// Remap a single raw code into `[-physical_range, +physical_range]`.
    pub fn remap(&self, code: u8) -> f64 {
        let span = 2.0 * self.physical_range;
        -self.physical_range + (code as f64 / self.raw_max as f64) * span
    }

    /// Remap a full raw sample.
    pub fn to_physical(&self, raw: RawSample) -> Sample {
        Sample::new(self.remap(raw.x), self.remap(raw.y), self.remap(raw.z))
    }
}

/// An acceleration sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Sample {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// One labeled recording of a motion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    /// Identifier of the recording (usually the file stem)
    pub name: String,
    /// Samples in recording order
    pub samples: Vec<Sample>,
}

impl Trial {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    /// Build a trial from raw device codes.
    pub fn from_raw(name: impl Into<String>, raw: &[RawSample], scale: &SampleScale) -> Self {
        Self::new(name, raw.iter().map(|r| scale.to_physical(*r)).collect())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
