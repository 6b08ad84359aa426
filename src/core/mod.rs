//! Core modeling and classification pipeline.
//!
//! This module contains:
//! - Gravity/body separation of acceleration samples
//! - Dataset assembly, cluster count selection and EM training
//! - Gaussian mixture regression into expected curves
//! - Class models, their artifacts and the stream classifier

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod gmm;
pub mod gmr;
pub mod kmeans;
pub mod linalg;
pub mod model;
pub mod selector;
pub mod separator;
pub mod windowing;

// Re-export commonly used types
pub use artifact::{ArtifactBuilder, ArtifactError, ModelArtifact, ARTIFACT_VERSION, PRODUCER_NAME};
pub use classifier::{possibility, StreamClassifier, StreamState};
pub use dataset::{ClassDatasets, Dataset, DatasetBuilder};
pub use error::ModelError;
pub use filter::{median_filter, ChebyshevLowPass, LowPassSpec};
pub use gmm::{GaussianComponent, GaussianMixture, GmmTrainer, TrainingReport};
pub use gmr::{query_times, ExpectedCurve, GaussianMixtureRegressor};
pub use model::{
    compute_threshold, mahalanobis_distance, BuildDiagnostics, ClassModel, ClassModelSet,
    FeatureDiagnostics, ModelBuilder, TrainedClass, TrainedModels,
};
pub use selector::{ClusterCountSelector, ClusterSelection};
pub use separator::{SeparatedFeatures, SignalSeparator};
pub use windowing::SampleWindow;
