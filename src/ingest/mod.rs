//! Sample ingestion for the HMP recognizer.
//!
//! This module turns raw device codes into physical accelerations and
//! reads recordings laid out on disk as a training corpus.

pub mod reader;
pub mod types;

// Re-export commonly used types
pub use reader::{discover_classes, read_class_dir, read_trial, IngestError};
pub use types::{RawSample, Sample, SampleScale, Trial, PHYSICAL_RANGE, RAW_MAX};
