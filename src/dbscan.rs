//! Density-based clustering over embedding vectors.
//!
//! Standard DBSCAN: a point with at least `min_points` neighbors within
//! `epsilon` (the neighborhood includes the point itself) is a core point;
//! clusters grow by expansion from core points; unreachable points are noise
//! and dropped. Discovery order is a function of input order, so repeated
//! runs over the same input produce identical index sets.

use std::collections::VecDeque;

use crate::config::DistanceMetric;

/// Cosine distance: `1 - (a.b) / (|a| * |b|)`. A zero-magnitude vector has
/// similarity 0 to everything, hence distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Standard L2 distance.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::Euclidean => euclidean_distance(a, b),
    }
}

fn region_query(
    points: &[Vec<f32>],
    center: usize,
    epsilon: f64,
    metric: DistanceMetric,
) -> Vec<usize> {
    (0..points.len())
        .filter(|&j| distance(metric, &points[center], &points[j]) <= epsilon)
        .collect()
}

/// Run DBSCAN and return one ascending index set per discovered cluster,
/// in discovery order. Noise points are not represented.
pub fn cluster(
    points: &[Vec<f32>],
    epsilon: f64,
    min_points: usize,
    metric: DistanceMetric,
) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut visited = vec![false; n];
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let neighbors = region_query(points, i, epsilon, metric);
        if neighbors.len() < min_points {
            continue; // noise unless a later expansion reaches it
        }

        let cluster_id = clusters.len();
        clusters.push(vec![i]);
        labels[i] = Some(cluster_id);

        let mut seeds: VecDeque<usize> = neighbors.into_iter().filter(|&j| j != i).collect();
        while let Some(j) = seeds.pop_front() {
            if !visited[j] {
                visited[j] = true;
                let expansion = region_query(points, j, epsilon, metric);
                if expansion.len() >= min_points {
                    seeds.extend(expansion);
                }
            }
            if labels[j].is_none() {
                labels[j] = Some(cluster_id);
                clusters[cluster_id].push(j);
            }
        }
        clusters[cluster_id].sort_unstable();
    }

    clusters
}
