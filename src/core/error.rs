//! Errors raised by the modeling and classification pipeline.

/// Errors from filter design, training and classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The low-pass specification cannot be realized
    InvalidFilter(String),
    /// A trial cannot contribute to a dataset
    InvalidTrial { index: usize, reason: String },
    /// Not enough points for the requested operation
    InsufficientData(String),
    /// A covariance matrix could not be factorized
    SingularCovariance(String),
    /// EM stopped at its iteration cap
    NotConverged { iterations: usize, relative_change: f64 },
    /// Separator, features and model set disagree in shape
    Mismatch(String),
    /// Failure while building one named class
    Class { name: String, source: Box<ModelError> },
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidFilter(e) => write!(f, "Invalid filter: {e}"),
            ModelError::InvalidTrial { index, reason } => {
                write!(f, "Invalid trial #{index}: {reason}")
            }
            ModelError::InsufficientData(e) => write!(f, "Insufficient data: {e}"),
            ModelError::SingularCovariance(e) => write!(f, "Singular covariance: {e}"),
            ModelError::NotConverged {
                iterations,
                relative_change,
            } => write!(
                f,
                "EM did not converge after {iterations} iterations (last relative change {relative_change:e})"
            ),
            ModelError::Mismatch(e) => write!(f, "Shape mismatch: {e}"),
            ModelError::Class { name, source } => write!(f, "Class '{name}': {source}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Class { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
