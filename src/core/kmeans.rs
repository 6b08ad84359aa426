//! Lloyd's K-means and silhouette scoring on 4-D points.

use crate::core::error::ModelError;
use crate::core::linalg::squared_distance;
use nalgebra::Vector4;
use rand::Rng;

/// Result of a K-means run.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub centroids: Vec<Vector4<f64>>,
    /// Cluster index of every point
    pub labels: Vec<usize>,
    /// Sum of squared distances to the assigned centroids
    pub inertia: f64,
}

impl Clustering {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Number of points in each cluster.
    pub fn sizes(&self) -> Vec<usize> {
        cluster_sizes(&self.labels, self.k())
    }

    /// Points grouped by cluster.
    pub fn members<'a>(&self, points: &'a [Vector4<f64>]) -> Vec<Vec<&'a Vector4<f64>>> {
        let mut groups = vec![Vec::new(); self.k()];
        for (point, &label) in points.iter().zip(&self.labels) {
            groups[label].push(point);
        }
        groups
    }
}

/// K-means with k-means++ seeding and restarts.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    restarts: usize,
    max_iterations: usize,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            restarts: 3,
            max_iterations: 100,
        }
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Cluster `points`, keeping the restart with the lowest inertia.
    pub fn fit<R: Rng + ?Sized>(
        &self,
        points: &[Vector4<f64>],
        rng: &mut R,
    ) -> Result<Clustering, ModelError> {
        if self.k == 0 || points.len() < self.k {
            return Err(ModelError::InsufficientData(format!(
                "cannot form {} clusters from {} points",
                self.k,
                points.len()
            )));
        }

        let mut best: Option<Clustering> = None;
        for _ in 0..self.restarts {
            let run = self.run_once(points, rng);
            if best.as_ref().map(|b| run.inertia < b.inertia).unwrap_or(true) {
                best = Some(run);
            }
        }

        best.ok_or_else(|| ModelError::InsufficientData("no K-means run completed".to_string()))
    }

    fn run_once<R: Rng + ?Sized>(&self, points: &[Vector4<f64>], rng: &mut R) -> Clustering {
        let mut centroids = seed_centroids(points, self.k, rng);
        let mut labels = vec![usize::MAX; points.len()];

        let mut converged = false;
        for _ in 0..self.max_iterations {
            if !assign(points, &centroids, &mut labels) {
                converged = true;
                break;
            }
            update_centroids(points, &mut labels, &mut centroids);
        }

        if !converged {
            // Labels must describe the centroids that are returned
            assign(points, &centroids, &mut labels);
            if cluster_sizes(&labels, self.k).contains(&0) {
                update_centroids(points, &mut labels, &mut centroids);
            }
        }

        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(p, &l)| squared_distance(p, &centroids[l]))
            .sum();

        Clustering {
            centroids,
            labels,
            inertia,
        }
    }
}

/// Move every point to its nearest centroid. Returns whether any label changed.
fn assign(points: &[Vector4<f64>], centroids: &[Vector4<f64>], labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (point, label) in points.iter().zip(labels.iter_mut()) {
        let nearest = nearest_centroid(point, centroids).0;
        if *label != nearest {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

fn cluster_sizes(labels: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }
    sizes
}

/// Recompute centroids as member means.
///
/// An empty cluster takes over the worst-served point of a cluster with at
/// least two members, so no cluster is left empty while `k <= points.len()`.
fn update_centroids(points: &[Vector4<f64>], labels: &mut [usize], centroids: &mut [Vector4<f64>]) {
    let k = centroids.len();
    let mut counts = cluster_sizes(labels, k);

    for c in 0..k {
        if counts[c] == 0 {
            if let Some(far) = farthest_point(points, labels, centroids, &counts) {
                counts[labels[far]] -= 1;
                counts[c] += 1;
                labels[far] = c;
                centroids[c] = points[far];
            }
        }
    }

    let mut sums = vec![Vector4::zeros(); k];
    for (point, &label) in points.iter().zip(labels.iter()) {
        sums[label] += point;
    }
    for c in 0..k {
        if counts[c] > 0 {
            centroids[c] = sums[c] / counts[c] as f64;
        }
    }
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the chosen ones.
fn seed_centroids<R: Rng + ?Sized>(points: &[Vector4<f64>], k: usize, rng: &mut R) -> Vec<Vector4<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let index = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in nearest.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };

        let centroid = points[index];
        for (p, d) in points.iter().zip(nearest.iter_mut()) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn nearest_centroid(point: &Vector4<f64>, centroids: &[Vector4<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// Point farthest from its centroid among clusters that can spare one.
fn farthest_point(
    points: &[Vector4<f64>],
    labels: &[usize],
    centroids: &[Vector4<f64>],
    counts: &[usize],
) -> Option<usize> {
    points
        .iter()
        .zip(labels)
        .enumerate()
        .filter(|(_, (_, l))| counts[**l] > 1)
        .map(|(i, (p, &l))| (i, squared_distance(p, &centroids[l])))
        .fold(None, |best: Option<(usize, f64)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
        .map(|(i, _)| i)
}

/// Silhouette value of every point, using squared Euclidean distance.
///
/// Points alone in their cluster score 0.
pub fn silhouette(points: &[Vector4<f64>], labels: &[usize], k: usize) -> Vec<f64> {
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut sums = vec![0.0; k];
    points
        .iter()
        .zip(labels)
        .map(|(point, &own)| {
            if sizes[own] <= 1 {
                return 0.0;
            }

            sums.iter_mut().for_each(|s| *s = 0.0);
            for (other, &label) in points.iter().zip(labels) {
                sums[label] += squared_distance(point, other);
            }

            // The point itself adds zero to its own cluster sum
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            if !b.is_finite() {
                return 0.0;
            }
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect()
}

/// Mean over non-empty clusters of each cluster's mean silhouette value.
pub fn cluster_fitness(points: &[Vector4<f64>], clustering: &Clustering) -> f64 {
    let k = clustering.k();
    let values = silhouette(points, &clustering.labels, k);

    let mut sums = vec![0.0; k];
    let mut counts = vec![0usize; k];
    for (value, &label) in values.iter().zip(&clustering.labels) {
        sums[label] += value;
        counts[label] += 1;
    }

    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .filter(|pair| *pair.1 > 0)
        .map(|(s, &n)| s / n as f64)
        .collect();

    if means.is_empty() {
        0.0
    } else {
        means.iter().sum::<f64>() / means.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blobs(centers: &[[f64; 4]], per_blob: usize, spread: f64, rng: &mut StdRng) -> Vec<Vector4<f64>> {
        let mut points = Vec::new();
        for center in centers {
            for _ in 0..per_blob {
                let jitter = Vector4::from_fn(|_, _| rng.gen_range(-spread..spread));
                points.push(Vector4::from(*center) + jitter);
            }
        }
        points
    }

    #[test]
    fn test_kmeans_recovers_blobs() {
        let mut rng = StdRng::seed_from_u64(7);
        let centers = [[0.0, 0.0, 0.0, 0.0], [10.0, 10.0, 0.0, 0.0], [0.0, 10.0, 10.0, 0.0]];
        let points = blobs(&centers, 20, 0.1, &mut rng);

        let clustering = KMeans::new(3).fit(&points, &mut rng).unwrap();
        assert_eq!(clustering.sizes(), vec![20, 20, 20]);

        // Points of one blob share a label
        for blob in 0..3 {
            let label = clustering.labels[blob * 20];
            assert!(clustering.labels[blob * 20..(blob + 1) * 20]
                .iter()
                .all(|&l| l == label));
        }
    }

    #[test]
    fn test_kmeans_rejects_too_few_points() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = vec![Vector4::zeros(); 2];
        assert!(KMeans::new(3).fit(&points, &mut rng).is_err());
        assert!(KMeans::new(0).fit(&points, &mut rng).is_err());
    }

    #[test]
    fn test_kmeans_handles_duplicate_points() {
        let mut rng = StdRng::seed_from_u64(3);
        let points = vec![Vector4::new(1.0, 1.0, 1.0, 1.0); 10];
        let clustering = KMeans::new(2).fit(&points, &mut rng).unwrap();
        assert_eq!(clustering.labels.len(), 10);
        assert_eq!(clustering.inertia, 0.0);
    }

    #[test]
    fn test_kmeans_never_leaves_a_cluster_empty() {
        // Duplicates make centroids tie, which starves clusters on every pass
        let mut points = vec![Vector4::new(1.0, 1.0, 1.0, 1.0); 6];
        points.push(Vector4::new(5.0, 5.0, 5.0, 5.0));

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let clustering = KMeans::new(3)
                .with_restarts(1)
                .with_max_iterations(5)
                .fit(&points, &mut rng)
                .unwrap();

            let sizes = clustering.sizes();
            assert!(sizes.iter().all(|&n| n > 0), "seed {seed}: {sizes:?}");
            assert_eq!(sizes.iter().sum::<usize>(), points.len());
        }
    }

    #[test]
    fn test_inertia_matches_returned_labels() {
        let mut rng = StdRng::seed_from_u64(21);
        let centers = [[0.0, 0.0, 0.0, 0.0], [4.0, 0.0, 0.0, 0.0], [8.0, 1.0, 0.0, 0.0]];
        let points = blobs(&centers, 15, 1.5, &mut rng);

        // A single iteration stops before convergence
        let clustering = KMeans::new(3)
            .with_restarts(1)
            .with_max_iterations(1)
            .fit(&points, &mut rng)
            .unwrap();

        let expected: f64 = points
            .iter()
            .zip(&clustering.labels)
            .map(|(p, &l)| squared_distance(p, &clustering.centroids[l]))
            .sum();
        assert!((clustering.inertia - expected).abs() < 1e-9);
        assert!(clustering.sizes().iter().all(|&n| n > 0));
    }

    #[test]
    fn test_silhouette_of_separated_clusters() {
        let mut rng = StdRng::seed_from_u64(11);
        let centers = [[0.0, 0.0, 0.0, 0.0], [50.0, 0.0, 0.0, 0.0]];
        let points = blobs(&centers, 15, 0.5, &mut rng);
        let labels: Vec<usize> = (0..30).map(|i| i / 15).collect();

        let values = silhouette(&points, &labels, 2);
        assert!(values.iter().all(|&s| s > 0.99));
    }

    #[test]
    fn test_silhouette_singleton_scores_zero() {
        let points = vec![
            Vector4::new(0.0, 0.0, 0.0, 0.0),
            Vector4::new(1.0, 0.0, 0.0, 0.0),
            Vector4::new(9.0, 0.0, 0.0, 0.0),
        ];
        let values = silhouette(&points, &[0, 0, 1], 2);
        assert_eq!(values[2], 0.0);
        // a = 1, b = 81
        assert!((values[0] - 80.0 / 81.0).abs() < 1e-12);
    }

    #[test]
    fn test_fitness_averages_cluster_means() {
        let points = vec![
            Vector4::new(0.0, 0.0, 0.0, 0.0),
            Vector4::new(1.0, 0.0, 0.0, 0.0),
            Vector4::new(9.0, 0.0, 0.0, 0.0),
        ];
        let clustering = Clustering {
            centroids: vec![Vector4::new(0.5, 0.0, 0.0, 0.0), Vector4::new(9.0, 0.0, 0.0, 0.0)],
            labels: vec![0, 0, 1],
            inertia: 0.5,
        };
        let values = silhouette(&points, &clustering.labels, 2);
        let expected = ((values[0] + values[1]) / 2.0 + 0.0) / 2.0;
        assert!((cluster_fitness(&points, &clustering) - expected).abs() < 1e-12);
    }
}
