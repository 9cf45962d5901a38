//! In-process density clustering over cosine distance.
//!
//! DBSCAN with two extra rules: clusters smaller than `min_cluster_size` are
//! dissolved into noise, and surviving clusters are renumbered `0..k` in
//! order of their first member.

use std::collections::{HashMap, VecDeque};

use linkdigest_shared::{ClusteringConfig, LinkDigestError, NOISE_LABEL, Result};
use tracing::debug;

use crate::traits::Clusterer;

#[derive(Debug, Clone)]
pub struct DensityClusterer {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub epsilon: f64,
}

impl From<&ClusteringConfig> for DensityClusterer {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            min_cluster_size: config.min_cluster_size.max(1),
            min_samples: config.min_samples.max(1),
            epsilon: config.epsilon,
        }
    }
}

impl Clusterer for DensityClusterer {
    fn clusterize(&self, vectors: &[Vec<f64>]) -> Result<Vec<i32>> {
        check_dimensions(vectors)?;

        let n = vectors.len();
        if n < self.min_cluster_size {
            return Ok(vec![NOISE_LABEL; n]);
        }

        let neighbourhoods: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| cosine_distance(&vectors[i], &vectors[j]) <= self.epsilon)
                    .collect()
            })
            .collect();
        let is_core = |i: usize| neighbourhoods[i].len() >= self.min_samples;

        let mut raw: Vec<Option<usize>> = vec![None; n];
        let mut next_cluster = 0;

        for seed in 0..n {
            if raw[seed].is_some() || !is_core(seed) {
                continue;
            }

            let cluster = next_cluster;
            next_cluster += 1;
            raw[seed] = Some(cluster);

            let mut queue: VecDeque<usize> = VecDeque::from([seed]);
            while let Some(point) = queue.pop_front() {
                if !is_core(point) {
                    continue;
                }
                for &neighbour in &neighbourhoods[point] {
                    if raw[neighbour].is_none() {
                        raw[neighbour] = Some(cluster);
                        queue.push_back(neighbour);
                    }
                }
            }
        }

        let labels = finalize(&raw, self.min_cluster_size);
        debug!(
            points = n,
            clusters = labels.iter().filter(|&&l| l != NOISE_LABEL).max().map_or(0, |m| m + 1),
            noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count(),
            "density clustering complete"
        );
        Ok(labels)
    }
}

/// Dissolve undersized clusters and renumber the rest by first appearance.
fn finalize(raw: &[Option<usize>], min_cluster_size: usize) -> Vec<i32> {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for cluster in raw.iter().flatten() {
        *sizes.entry(*cluster).or_default() += 1;
    }

    let mut renumbered: HashMap<usize, i32> = HashMap::new();
    raw.iter()
        .map(|assignment| match assignment {
            Some(cluster) if sizes[cluster] >= min_cluster_size => {
                let next = renumbered.len() as i32;
                *renumbered.entry(*cluster).or_insert(next)
            }
            _ => NOISE_LABEL,
        })
        .collect()
}

fn check_dimensions(vectors: &[Vec<f64>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(LinkDigestError::validation("vectors must not be empty"));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != first.len()) {
        return Err(LinkDigestError::validation(format!(
            "vector {i} has {} dimensions, expected {}",
            v.len(),
            first.len()
        )));
    }
    Ok(())
}

/// `1 - cos(a, b)`. A zero vector is maximally distant from everything.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
