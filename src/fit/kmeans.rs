//! Lloyd's k-means with k-means++ seeding.

use rand::distributions::{Distribution as _, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{ClusterFit, ClusterFitter};
use crate::config::KMEANS_MAX_ITERATIONS;
use crate::error::FitError;
use crate::model::{squared_distance, ClusterModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LloydKMeans {
    pub max_iterations: usize,
}

impl Default for LloydKMeans {
    fn default() -> Self {
        LloydKMeans { max_iterations: KMEANS_MAX_ITERATIONS }
    }
}

/// k-means++: the first center is a uniform pick, every further one is drawn
/// with probability proportional to its squared distance to the nearest
/// center chosen so far.
fn seed_centers(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = vec![points[rng.gen_range(0..points.len())].clone()];
    while centers.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centers
                    .iter()
                    .map(|c| squared_distance(c, p))
                    .fold(f64::INFINITY, f64::min)
            })
            .map(|d| if d.is_finite() { d } else { 0.0 })
            .collect();
        let next = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // All points coincide with a center already.
            Err(_) => rng.gen_range(0..points.len()),
        };
        centers.push(points[next].clone());
    }
    centers
}

fn assign(centers: &[Vec<f64>], points: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let mut closest = 0;
            let mut closest_dist = f64::MAX;
            for (index, center) in centers.iter().enumerate() {
                let dist = squared_distance(center, p);
                if dist < closest_dist {
                    closest_dist = dist;
                    closest = index;
                }
            }
            closest
        })
        .collect()
}

impl ClusterFitter for LloydKMeans {
    fn fit_clusters(&self, points: &[Vec<f64>], k: usize, seed: u64) -> Result<ClusterFit, FitError> {
        if points.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        if k == 0 || points.len() < k {
            return Err(FitError::TooFewRows { k, rows: points.len() });
        }
        let dimension = points[0].len();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut centers = seed_centers(points, k, &mut rng);
        let mut labels = assign(&centers, points);

        for iteration in 0..self.max_iterations {
            let mut sums = vec![vec![0.0; dimension]; k];
            let mut counts = vec![0usize; k];
            for (point, &label) in points.iter().zip(&labels) {
                counts[label] += 1;
                for (acc, value) in sums[label].iter_mut().zip(point) {
                    *acc += value;
                }
            }
            for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(&counts) {
                // An emptied cluster keeps its previous center.
                if count > 0 {
                    *center = sum.into_iter().map(|s| s / count as f64).collect();
                }
            }

            let next = assign(&centers, points);
            if next == labels {
                debug!("[CLUSTER] k-means converged after {} iteration(s)", iteration + 1);
                break;
            }
            labels = next;
        }

        Ok(ClusterFit { model: ClusterModel::new(centers)?, labels })
    }
}
