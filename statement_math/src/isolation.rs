//! Isolation-tree ensemble for unsupervised anomaly scoring
//!
//! Each tree partitions a random subsample on a random dimension at a random
//! threshold until points are isolated or the depth limit
//! `ceil(log2(sample_size))` is reached. Points that are isolated after few
//! splits are unusual. The anomaly score is
//!
//! ```text
//! s(x) = 2 ^ ( -E[h(x)] / c(sample_size) )
//! ```
//!
//! where `h(x)` is the path length in one tree and `c(n)` the average path
//! length of an unsuccessful binary-search-tree lookup over `n` points.
//! Scores lie in `(0, 1]`; higher means more anomalous.

use crate::{MathError, Result};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful search in a binary search tree
/// built from `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A single randomized partitioning tree
#[derive(Debug, Clone)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(data: &[Vec<f64>], rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow(data, rows, 0, max_depth, rng),
        }
    }

    /// Path length of `point`, including the `c(size)` adjustment at the leaf
    pub fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;

        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

fn grow(
    data: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if rows.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: rows.len() };
    }

    // Only dimensions with spread can separate anything.
    let dimensions = data[rows[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..dimensions)
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[r][feature]), hi.max(data[r][feature]))
            });
            (lo < hi).then_some((feature, lo, hi))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left_rows, depth + 1, max_depth, rng)),
        right: Box::new(grow(data, right_rows, depth + 1, max_depth, rng)),
    }
}

/// Fitted ensemble of isolation trees
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    dimensions: usize,
}

impl IsolationForest {
    /// Build `n_trees` trees over subsamples of at most `max_samples` rows.
    ///
    /// Every row of `data` must have the same, non-zero number of columns and
    /// only finite values. The same `seed` always produces the same forest.
    pub fn fit(data: &[Vec<f64>], n_trees: usize, max_samples: usize, seed: u64) -> Result<Self> {
        if data.len() < 2 {
            return Err(MathError::InsufficientData {
                required: 2,
                actual: data.len(),
            });
        }
        if n_trees == 0 {
            return Err(MathError::InvalidInput(
                "Number of trees must be greater than zero".to_string(),
            ));
        }
        if max_samples < 2 {
            return Err(MathError::InvalidInput(
                "Sample size must be at least 2".to_string(),
            ));
        }

        let dimensions = data[0].len();
        if dimensions == 0 {
            return Err(MathError::InvalidInput(
                "Observations must have at least one feature".to_string(),
            ));
        }
        for (i, row) in data.iter().enumerate() {
            if row.len() != dimensions {
                return Err(MathError::InvalidInput(format!(
                    "Row {} has {} features, expected {}",
                    i,
                    row.len(),
                    dimensions
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(MathError::CalculationError(format!(
                    "Row {} contains a non-finite value",
                    i
                )));
            }
        }

        let sample_size = max_samples.min(data.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..n_trees)
            .map(|_| {
                let rows = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, rows, max_depth, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            dimensions,
        })
    }

    /// Anomaly score of one observation, in `(0, 1]`
    pub fn score(&self, point: &[f64]) -> Result<f64> {
        if point.len() != self.dimensions {
            return Err(MathError::InvalidInput(format!(
                "Observation has {} features, expected {}",
                point.len(),
                self.dimensions
            )));
        }

        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;

        Ok(2f64.powf(-mean_path / average_path_length(self.sample_size)))
    }

    /// Scores for every row of `data`
    pub fn score_all(&self, data: &[Vec<f64>]) -> Result<Vec<f64>> {
        data.iter().map(|row| self.score(row)).collect()
    }

    /// Number of trees in the ensemble
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Rows drawn per tree
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// Indices of scores strictly above the contamination quantile.
///
/// The threshold is the highest score outside the top
/// `ceil(contamination * n)`. Scores tied with it stay unflagged, so at most
/// that many indices are returned and a set with no spread returns none.
pub fn top_fraction(scores: &[f64], contamination: f64) -> Result<Vec<usize>> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(MathError::InvalidInput(format!(
            "Contamination must be in (0, 0.5], got {}",
            contamination
        )));
    }

    let count = (scores.len() as f64 * contamination).ceil() as usize;
    if count >= scores.len() {
        // Nothing to compare a lone score against.
        return Ok(Vec::new());
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let threshold = sorted[count];

    Ok((0..scores.len())
        .filter(|&i| scores[i] > threshold)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let x = 100.0 + (i % 5) as f64;
                let y = 50.0 + (i % 4) as f64 * 0.5;
                vec![x, y]
            })
            .collect();
        data.push(vec![400.0, -80.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln 255 + gamma) - 2 * 255 / 256
        assert_approx_eq!(average_path_length(256), 10.244, 1e-3);
    }

    #[test]
    fn test_outlier_scores_highest() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 256, 7).unwrap();
        let scores = forest.score_all(&data).unwrap();

        let (argmax, _) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(argmax, data.len() - 1);
        assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_same_seed_same_scores() {
        let data = cluster_with_outlier();
        let a = IsolationForest::fit(&data, 50, 16, 42).unwrap();
        let b = IsolationForest::fit(&data, 50, 16, 42).unwrap();
        assert_eq!(a.score_all(&data).unwrap(), b.score_all(&data).unwrap());
        assert_eq!(a.sample_size(), 16);
        assert_eq!(a.n_trees(), 50);
    }

    #[test]
    fn test_identical_rows_do_not_split() {
        let data = vec![vec![1.0, 1.0]; 8];
        let forest = IsolationForest::fit(&data, 10, 8, 1).unwrap();
        let scores = forest.score_all(&data).unwrap();
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            IsolationForest::fit(&[vec![1.0]], 10, 8, 1),
            Err(MathError::InsufficientData { .. })
        ));
        assert!(IsolationForest::fit(&[vec![1.0], vec![1.0, 2.0]], 10, 8, 1).is_err());
        assert!(IsolationForest::fit(&[vec![1.0], vec![f64::NAN]], 10, 8, 1).is_err());
        assert!(IsolationForest::fit(&[vec![1.0], vec![2.0]], 0, 8, 1).is_err());
    }

    #[test]
    fn test_top_fraction() {
        let scores = [0.4, 0.9, 0.4, 0.7, 0.5];
        assert_eq!(top_fraction(&scores, 0.05).unwrap(), vec![1]);
        assert_eq!(top_fraction(&scores, 0.4).unwrap(), vec![1, 3]);
        assert!(top_fraction(&scores, 0.0).is_err());
        assert!(top_fraction(&scores, 0.6).is_err());
        assert!(top_fraction(&[], 0.1).unwrap().is_empty());
        assert!(top_fraction(&[0.8], 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_top_fraction_leaves_ties_at_threshold() {
        assert!(top_fraction(&[0.5; 10], 0.05).unwrap().is_empty());
        // Two scores share the top spot but only one slot is available.
        assert!(top_fraction(&[0.3, 0.9, 0.9, 0.4], 0.25).unwrap().is_empty());
        assert_eq!(
            top_fraction(&[0.3, 0.9, 0.9, 0.4], 0.5).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_constant_data_flags_nothing() {
        let data = vec![vec![120.0]; 10];
        let forest = IsolationForest::fit(&data, 100, 256, 42).unwrap();
        let scores = forest.score_all(&data).unwrap();
        assert!(top_fraction(&scores, 0.05).unwrap().is_empty());
    }
}
