//! HMP Recognizer - Gaussian mixture models of human motion primitives.
//!
//! This library builds statistical models of labeled tri-axial
//! accelerometer recordings and classifies live sample streams against them.
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HMP Recognizer                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Ingest    │──▶│  Separator  │──▶│   Dataset   │       │
//! │  │ (raw remap) │   │(gravity/body│   │ (t, x, y, z)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                  │              │
//! │                           │                  ▼              │
//! │                           │     ┌──────────────────────┐   │
//! │                           │     │ K selection ▶ EM ▶ GMR│   │
//! │                           │     └──────────────────────┘   │
//! │                           ▼                  │              │
//! │  ┌─────────────┐   ┌─────────────┐           ▼              │
//! │  │ Validation  │◀──│   Stream    │◀──  Class models        │
//! │  │    Log      │   │ Classifier  │     (artifact)          │
//! │  └─────────────┘   └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hmp_recognizer::{ingest, Config, ModelBuilder, StreamClassifier, SignalSeparator};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let trials = ingest::read_class_dir(Path::new("corpus/drink"), &config.ingest).unwrap();
//!
//! let builder = ModelBuilder::new(&config).unwrap();
//! let trained = builder.build_all(&[("drink".to_string(), trials)]).unwrap();
//!
//! let separator = SignalSeparator::new(&config.separation).unwrap();
//! let mut classifier = StreamClassifier::new(Arc::new(trained.models), separator).unwrap();
//! let possibilities = classifier.push(ingest::Sample::new(0.0, 0.0, 9.81)).unwrap();
//! ```

pub mod config;
pub mod core;
pub mod ingest;
pub mod report;

// Re-export key types at crate root for convenience
pub use config::{ClusteringConfig, Config, ConfigError, SeparationConfig, TrainingConfig};
pub use core::{
    possibility, ClassModel, ClassModelSet, ExpectedCurve, ModelArtifact, ModelBuilder,
    ModelError, SignalSeparator, StreamClassifier, StreamState,
};
pub use ingest::{IngestError, Sample, Trial};
pub use report::{SharedValidationLog, ValidationLog, ValidationStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
