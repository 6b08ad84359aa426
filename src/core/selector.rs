//! Choice of the number of Gaussian components with a silhouette elbow rule.

use crate::config::ClusteringConfig;
use crate::core::dataset::Dataset;
use crate::core::error::ModelError;
use crate::core::kmeans::{cluster_fitness, KMeans};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of a cluster count search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSelection {
    /// Chosen number of components
    pub k: usize,
    /// Fitness of every K that was evaluated, in order
    pub fitness: Vec<(usize, f64)>,
    /// False when the cap was reached before fitness dropped
    pub converged: bool,
}

/// Increases K until clustering quality drops below a threshold.
#[derive(Debug, Clone)]
pub struct ClusterCountSelector {
    quality_threshold: f64,
    max_clusters: Option<usize>,
    restarts: usize,
    max_iterations: usize,
}

impl ClusterCountSelector {
    pub fn new(config: &ClusteringConfig) -> Self {
        Self {
            quality_threshold: config.quality_threshold,
            max_clusters: config.max_clusters,
            restarts: config.restarts,
            max_iterations: config.max_iterations,
        }
    }

    /// Largest K tried for `dataset`.
    pub fn cap(&self, dataset: &Dataset) -> usize {
        let cap = self
            .max_clusters
            .unwrap_or_else(|| (dataset.max_time() / 2.0).floor().max(0.0) as usize);
        // Silhouette needs at least one point more than clusters
        cap.min(dataset.len().saturating_sub(1))
    }

    /// Select K for `dataset`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<ClusterSelection, ModelError> {
        let cap = self.cap(dataset);
        let mut fitness = Vec::new();

        for k in 2..=cap {
            let clustering = KMeans::new(k)
                .with_restarts(self.restarts)
                .with_max_iterations(self.max_iterations)
                .fit(dataset.points(), rng)?;
            let score = cluster_fitness(dataset.points(), &clustering);
            debug!(k, fitness = score, "Evaluated cluster count");
            fitness.push((k, score));

            if score < self.quality_threshold {
                return Ok(ClusterSelection {
                    k: k - 1,
                    fitness,
                    converged: true,
                });
            }
        }

        let k = cap.max(1);
        warn!(
            k,
            threshold = self.quality_threshold,
            "Cluster count reached its cap before fitness dropped"
        );
        Ok(ClusterSelection {
            k,
            fitness,
            converged: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tight_clusters(k_true: usize, per_cluster: usize, rng: &mut StdRng) -> Dataset {
        let mut points = Vec::new();
        for c in 0..k_true {
            let offset = 20.0 * c as f64;
            let center = Vector4::new(2.0 + offset * 0.25, offset, -offset, 0.5 * offset);
            for _ in 0..per_cluster {
                let jitter = Vector4::from_fn(|_, _| rng.gen_range(-0.01..0.01));
                points.push(center + jitter);
            }
        }
        Dataset::from_points(points).unwrap()
    }

    #[test]
    fn test_finds_true_cluster_count() {
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let dataset = tight_clusters(3, 30, &mut rng);
            let selector = ClusterCountSelector::new(&ClusteringConfig {
                max_clusters: Some(8),
                ..ClusteringConfig::default()
            });

            let selection = selector.select(&dataset, &mut rng).unwrap();
            assert!(
                (2..=4).contains(&selection.k),
                "seed {seed} picked {}",
                selection.k
            );
            assert!(selection.converged);
        }
    }

    #[test]
    fn test_cap_defaults_to_half_max_time() {
        let points = (1..=20)
            .map(|t| Vector4::new(t as f64, 0.0, 0.0, 0.0))
            .collect();
        let dataset = Dataset::from_points(points).unwrap();
        let selector = ClusterCountSelector::new(&ClusteringConfig::default());
        assert_eq!(selector.cap(&dataset), 10);
    }

    #[test]
    fn test_cap_reached_is_reported() {
        let mut rng = StdRng::seed_from_u64(5);
        let dataset = tight_clusters(6, 10, &mut rng);
        let selector = ClusterCountSelector::new(&ClusteringConfig {
            max_clusters: Some(3),
            ..ClusteringConfig::default()
        });

        let selection = selector.select(&dataset, &mut rng).unwrap();
        assert_eq!(selection.k, 3);
        assert!(!selection.converged);
        assert_eq!(selection.fitness.len(), 2);
    }

    #[test]
    fn test_small_cap_returns_single_component() {
        let points = vec![Vector4::new(1.0, 0.0, 0.0, 0.0), Vector4::new(2.0, 1.0, 0.0, 0.0)];
        let dataset = Dataset::from_points(points).unwrap();
        let selector = ClusterCountSelector::new(&ClusteringConfig::default());
        let mut rng = StdRng::seed_from_u64(0);

        let selection = selector.select(&dataset, &mut rng).unwrap();
        assert_eq!(selection.k, 1);
        assert!(selection.fitness.is_empty());
    }
}
