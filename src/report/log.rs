//! Stream validation log.
//!
//! Counters are atomic so one log can be shared between streams; per-class
//! tallies sit behind a mutex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClassTally {
    name: String,
    /// Classified frames where this class was the best positive match
    detections: u64,
    peak_possibility: f64,
    possibility_sum: f64,
    frames: u64,
}

/// Statistics of one stream validation session.
#[derive(Debug)]
pub struct ValidationLog {
    /// Number of samples pushed through a classifier
    samples_processed: AtomicU64,
    /// Number of samples that produced a classification
    windows_classified: AtomicU64,
    /// Number of classified frames with any positive possibility
    frames_matched: AtomicU64,
    classes: Mutex<Vec<ClassTally>>,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ValidationLog {
    /// Create a log for the given classes, in classification order.
    pub fn new<S: AsRef<str>>(class_names: &[S]) -> Self {
        let classes = class_names
            .iter()
            .map(|name| ClassTally {
                name: name.as_ref().to_string(),
                ..ClassTally::default()
            })
            .collect();

        Self {
            samples_processed: AtomicU64::new(0),
            windows_classified: AtomicU64::new(0),
            frames_matched: AtomicU64::new(0),
            classes: Mutex::new(classes),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues from statistics saved at `path`.
    pub fn with_persistence<S: AsRef<str>>(class_names: &[S], path: PathBuf) -> Self {
        let mut log = Self::new(class_names);
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("Could not load previous validation stats: {e}");
        }

        log
    }

    fn tallies(&self) -> MutexGuard<'_, Vec<ClassTally>> {
        self.classes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a sample that did not produce a classification.
    pub fn record_sample(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a classified sample with one possibility per class.
    pub fn record_classification(&self, possibilities: &[f64]) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
        self.windows_classified.fetch_add(1, Ordering::Relaxed);

        let best = possibilities
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        if best.is_some() {
            self.frames_matched.fetch_add(1, Ordering::Relaxed);
        }

        let mut tallies = self.tallies();
        for (i, (tally, &p)) in tallies.iter_mut().zip(possibilities).enumerate() {
            tally.frames += 1;
            tally.possibility_sum += p;
            tally.peak_possibility = tally.peak_possibility.max(p);
            if best == Some(i) {
                tally.detections += 1;
            }
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ValidationStats {
        let classes = self
            .tallies()
            .iter()
            .map(|t| ClassStats {
                name: t.name.clone(),
                detections: t.detections,
                peak_possibility: t.peak_possibility,
                mean_possibility: if t.frames > 0 {
                    t.possibility_sum / t.frames as f64
                } else {
                    0.0
                },
            })
            .collect();

        ValidationStats {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            frames_matched: self.frames_matched.load(Ordering::Relaxed),
            classes,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut out = format!(
            "Validation Statistics:\n\
             - Samples processed: {}\n\
             - Windows classified: {}\n\
             - Frames with a match: {}\n\
             \n\
             Per class (detections / peak / mean possibility):",
            stats.samples_processed, stats.windows_classified, stats.frames_matched
        );
        for class in &stats.classes {
            out.push_str(&format!(
                "\n - {}: {} / {:.3} / {:.3}",
                class.name, class.detections, class.peak_possibility, class.mean_possibility
            ));
        }
        out
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                samples_processed: self.samples_processed.load(Ordering::Relaxed),
                windows_classified: self.windows_classified.load(Ordering::Relaxed),
                frames_matched: self.frames_matched.load(Ordering::Relaxed),
                classes: self.tallies().clone(),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk. Tallies of classes not in this log are dropped.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_processed
                    .store(persisted.samples_processed, Ordering::Relaxed);
                self.windows_classified
                    .store(persisted.windows_classified, Ordering::Relaxed);
                self.frames_matched
                    .store(persisted.frames_matched, Ordering::Relaxed);

                let mut tallies = self.tallies();
                for tally in tallies.iter_mut() {
                    if let Some(saved) = persisted.classes.iter().find(|c| c.name == tally.name) {
                        *tally = saved.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_processed.store(0, Ordering::Relaxed);
        self.windows_classified.store(0, Ordering::Relaxed);
        self.frames_matched.store(0, Ordering::Relaxed);
        for tally in self.tallies().iter_mut() {
            *tally = ClassTally {
                name: std::mem::take(&mut tally.name),
                ..ClassTally::default()
            };
        }
    }
}

/// Statistics of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub name: String,
    pub detections: u64,
    pub peak_possibility: f64,
    pub mean_possibility: f64,
}

/// Snapshot of validation statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStats {
    pub samples_processed: u64,
    pub windows_classified: u64,
    pub frames_matched: u64,
    pub classes: Vec<ClassStats>,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_processed: u64,
    windows_classified: u64,
    frames_matched: u64,
    classes: Vec<ClassTally>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared validation log.
pub type SharedValidationLog = Arc<ValidationLog>;

/// Create a new shared validation log.
pub fn create_shared_log<S: AsRef<str>>(class_names: &[S]) -> SharedValidationLog {
    Arc::new(ValidationLog::new(class_names))
}

/// Create a new shared validation log with persistence.
pub fn create_shared_log_with_persistence<S: AsRef<str>>(
    class_names: &[S],
    path: PathBuf,
) -> SharedValidationLog {
    Arc::new(ValidationLog::with_persistence(class_names, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_log_counting() {
        let log = ValidationLog::new(&["sit", "stand"]);

        log.record_sample();
        log.record_classification(&[0.0, 0.0]);
        log.record_classification(&[0.2, 0.6]);
        log.record_classification(&[0.8, 0.4]);

        let stats = log.stats();
        assert_eq!(stats.samples_processed, 4);
        assert_eq!(stats.windows_classified, 3);
        assert_eq!(stats.frames_matched, 2);
        assert_eq!(stats.classes[0].detections, 1);
        assert_eq!(stats.classes[1].detections, 1);
        assert_eq!(stats.classes[0].peak_possibility, 0.8);
        assert!((stats.classes[1].mean_possibility - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_validation_log_reset() {
        let log = ValidationLog::new(&["sit"]);
        log.record_classification(&[0.5]);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.samples_processed, 0);
        assert_eq!(stats.classes[0].name, "sit");
        assert_eq!(stats.classes[0].detections, 0);
    }

    #[test]
    fn test_shared_log_across_threads() {
        let log = create_shared_log(&["a"]);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let log = Arc::clone(&log);
                scope.spawn(move || {
                    for _ in 0..100 {
                        log.record_classification(&[1.0]);
                    }
                });
            }
        });
        assert_eq!(log.stats().classes[0].detections, 400);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("hmp-validation-{}", uuid::Uuid::new_v4()))
            .join("validation.json");

        let log = ValidationLog::with_persistence(&["sit", "stand"], path.clone());
        log.record_classification(&[0.9, 0.1]);
        log.save().unwrap();

        let restored = ValidationLog::with_persistence(&["stand", "sit"], path.clone());
        let stats = restored.stats();
        assert_eq!(stats.windows_classified, 1);
        assert_eq!(stats.classes[1].name, "sit");
        assert_eq!(stats.classes[1].detections, 1);

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_summary_format() {
        let log = ValidationLog::new(&["walk"]);
        let summary = log.summary();

        assert!(summary.contains("Samples processed"));
        assert!(summary.contains("- walk: 0"));
    }
}
