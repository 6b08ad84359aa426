//! Reader for recording files and training corpora.
//!
//! A recording file holds one sample per line: three whitespace-separated
//! raw codes (x, y, z). A corpus is a directory with one sub-directory per
//! motion class, each containing recording files.

use crate::ingest::types::{RawSample, SampleScale, Trial};
use std::path::{Path, PathBuf};

/// Extension of recording files inside a corpus.
pub const TRIAL_EXTENSION: &str = "txt";

/// Parse raw samples from the text of a recording file.
pub fn parse_raw_samples(content: &str, scale: &SampleScale) -> Result<Vec<RawSample>, IngestError> {
    let mut samples = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut codes = [0u8; 3];
        let mut count = 0;
        for token in trimmed.split_whitespace() {
            if count == 3 {
                return Err(IngestError::Parse {
                    line: line_no,
                    message: "expected 3 values".to_string(),
                });
            }
            let value: i64 = token.parse().map_err(|_| IngestError::Parse {
                line: line_no,
                message: format!("'{token}' is not an integer"),
            })?;
            if value < 0 || value > scale.raw_max as i64 {
                return Err(IngestError::OutOfRange {
                    line: line_no,
                    value,
                });
            }
            codes[count] = value as u8;
            count += 1;
        }

        if count != 3 {
            return Err(IngestError::Parse {
                line: line_no,
                message: format!("expected 3 values, found {count}"),
            });
        }

        samples.push(RawSample::new(codes[0], codes[1], codes[2]));
    }

    Ok(samples)
}

/// Read a single recording file into a physical-unit trial.
pub fn read_trial(path: &Path, scale: &SampleScale) -> Result<Trial, IngestError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Io(format!("{}: {e}", path.display())))?;
    let raw = parse_raw_samples(&content, scale).map_err(|e| e.in_file(path))?;

    if raw.is_empty() {
        return Err(IngestError::Empty(path.display().to_string()));
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Trial::from_raw(name, &raw, scale))
}

/// Read every recording file of one class directory, sorted by file name.
pub fn read_class_dir(dir: &Path, scale: &SampleScale) -> Result<Vec<Trial>, IngestError> {
    let mut files = list_entries(dir, |p| {
        p.is_file() && p.extension().map(|e| e == TRIAL_EXTENSION).unwrap_or(false)
    })?;
    files.sort();

    if files.is_empty() {
        return Err(IngestError::Empty(dir.display().to_string()));
    }

    files.iter().map(|f| read_trial(f, scale)).collect()
}

/// List class directories of a corpus as `(class name, path)` pairs.
pub fn discover_classes(root: &Path) -> Result<Vec<(String, PathBuf)>, IngestError> {
    let mut dirs = list_entries(root, |p| p.is_dir())?;
    dirs.sort();

    Ok(dirs
        .into_iter()
        .filter_map(|p| {
            p.file_name()
                .map(|n| (n.to_string_lossy().into_owned(), p.clone()))
        })
        .collect())
}

fn list_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, IngestError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| IngestError::Io(format!("{}: {e}", dir.display())))?;

    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| keep(p))
        .collect())
}

/// Errors raised while reading recordings.
#[derive(Debug)]
pub enum IngestError {
    Io(String),
    Parse { line: usize, message: String },
    OutOfRange { line: usize, value: i64 },
    Empty(String),
    InFile { path: String, source: Box<IngestError> },
}

impl IngestError {
    fn in_file(self, path: &Path) -> Self {
        IngestError::InFile {
            path: path.display().to_string(),
            source: Box::new(self),
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "IO error: {e}"),
            IngestError::Parse { line, message } => write!(f, "Parse error on line {line}: {message}"),
            IngestError::OutOfRange { line, value } => {
                write!(f, "Raw value {value} out of range on line {line}")
            }
            IngestError::Empty(what) => write!(f, "No samples found in {what}"),
            IngestError::InFile { path, source } => write!(f, "{path}: {source}"),
        }
    }
}

impl std::error::Error for IngestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_samples() {
        let content = "22 49 35\n22 49 35\n\n23 51 35\n";
        let samples = parse_raw_samples(content, &SampleScale::default()).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2], RawSample::new(23, 51, 35));
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        let err = parse_raw_samples("1 2\n", &SampleScale::default()).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 1, .. }));

        let err = parse_raw_samples("1 2 3\n1 2 3 4\n", &SampleScale::default()).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let err = parse_raw_samples("1 64 3\n", &SampleScale::default()).unwrap_err();
        assert!(matches!(err, IngestError::OutOfRange { value: 64, .. }));
    }

    #[test]
    fn test_read_corpus_layout() {
        let root = std::env::temp_dir().join(format!("hmp-corpus-{}", uuid::Uuid::new_v4()));
        let class_dir = root.join("Drink_glass");
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join("b.txt"), "1 2 3\n4 5 6\n").unwrap();
        std::fs::write(class_dir.join("a.txt"), "7 8 9\n").unwrap();
        std::fs::write(class_dir.join("notes.md"), "ignored").unwrap();

        let classes = discover_classes(&root).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].0, "Drink_glass");

        let trials = read_class_dir(&classes[0].1, &SampleScale::default()).unwrap();
        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].name, "a");
        assert_eq!(trials[1].len(), 2);

        std::fs::remove_dir_all(&root).ok();
    }
}
