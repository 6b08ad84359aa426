//! Persisted model artifacts.
//!
//! An artifact is a JSON document holding every class model together with
//! the filter delay it was trained with, so that a classifier can be rebuilt
//! without retraining.

use crate::core::error::ModelError;
use crate::core::model::{BuildDiagnostics, ClassModel, ClassModelSet};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The current artifact format version.
pub const ARTIFACT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "hmp-recognizer";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Trained class models as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Artifact schema version
    pub artifact_version: String,
    /// Producer metadata
    pub producer: ArtifactProducer,
    /// When the models were written (RFC3339)
    pub created_at_utc: String,
    /// Samples consumed by delay compensation when the models were trained
    pub filter_delay: usize,
    /// Class models in classification order
    pub models: Vec<ClassModel>,
    /// Training summary per class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<BuildDiagnostics>>,
}

impl ModelArtifact {
    /// Load and version-check an artifact.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ArtifactError::Io(e.to_string()))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|e| ArtifactError::Parse(e.to_string()))?;

        if artifact.artifact_version != ARTIFACT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(artifact.artifact_version));
        }
        Ok(artifact)
    }

    /// Write the artifact as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArtifactError::Io(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ArtifactError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ArtifactError::Io(e.to_string()))
    }

    /// Validate the stored curves and rebuild the model set.
    pub fn into_model_set(self) -> Result<ClassModelSet, ArtifactError> {
        ClassModelSet::new(self.models, self.filter_delay).map_err(ArtifactError::Invalid)
    }
}

/// Builder for model artifacts.
pub struct ArtifactBuilder {
    instance_id: Uuid,
    diagnostics: Option<Vec<BuildDiagnostics>>,
}

impl ArtifactBuilder {
    /// Create a new builder with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            diagnostics: None,
        }
    }

    /// Store training diagnostics alongside the models.
    pub fn with_diagnostics(mut self, diagnostics: Vec<BuildDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn build(&self, models: &ClassModelSet) -> ModelArtifact {
        ModelArtifact {
            artifact_version: ARTIFACT_VERSION.to_string(),
            producer: ArtifactProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: Some(self.instance_id.to_string()),
            },
            created_at_utc: Utc::now().to_rfc3339(),
            filter_delay: models.filter_delay(),
            models: models.models().to_vec(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Artifact persistence errors.
#[derive(Debug)]
pub enum ArtifactError {
    Io(String),
    Parse(String),
    Serialize(String),
    UnsupportedVersion(String),
    Invalid(ModelError),
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::Io(e) => write!(f, "IO error: {e}"),
            ArtifactError::Parse(e) => write!(f, "Parse error: {e}"),
            ArtifactError::Serialize(e) => write!(f, "Serialize error: {e}"),
            ArtifactError::UnsupportedVersion(v) => {
                write!(f, "Unsupported artifact version {v} (expected {ARTIFACT_VERSION})")
            }
            ArtifactError::Invalid(e) => write!(f, "Invalid artifact: {e}"),
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}
