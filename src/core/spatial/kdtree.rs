use faer::MatRef;

use crate::utils::general::array_max_min;

/// Leaf capacity; below this the linear scan beats further splitting
const LEAF_SIZE: usize = 16;

//////////////
// KD tree  //
//////////////

/// Tree node representation for binary space partitioning
///
/// Each node is either a split (axis-aligned hyperplane and child pointers)
/// or a leaf (with point indices)
#[derive(Clone)]
enum KdNode {
    /// Internal node splitting space at `threshold` along `axis`
    Split {
        /// Coordinate axis of the splitting hyperplane
        axis: usize,
        /// Median coordinate along the axis; left holds values <= threshold,
        /// right holds values >= threshold
        threshold: f64,
        /// Index of left child node
        left: usize,
        /// Index of right child node
        right: usize,
    },
    /// Terminal node containing actual point indices
    Leaf {
        /// Indices of points that ended up in this partition
        items: Vec<usize>,
    },
}

/// Balanced KD-tree over a coordinate set for exact radius queries
///
/// Splits are made at the median along the widest axis, so the tree depth is
/// logarithmic regardless of the point distribution and construction is
/// fully deterministic (no randomness involved).
///
/// ### Fields
///
/// * `nodes` - Arena of tree nodes, index 0 = root
/// * `points_flat` - Original coordinates, flattened row-major for cache
///   locality
/// * `dim` - Number of spatial dimensions
pub struct KdTree {
    nodes: Vec<KdNode>,
    points_flat: Vec<f64>,
    dim: usize,
}

impl KdTree {
    /// Build the tree from a coordinate matrix
    ///
    /// ### Params
    ///
    /// * `coords` - Matrix with rows = samples and columns = spatial
    ///   dimensions. Values must be finite.
    ///
    /// ### Returns
    ///
    /// Initialised KdTree ready for querying.
    pub fn new(coords: MatRef<f64>) -> Self {
        let n_points = coords.nrows();
        let dim = coords.ncols();

        // flat structure for better cache locality
        let mut points_flat = Vec::with_capacity(n_points * dim);
        for i in 0..n_points {
            for d in 0..dim {
                points_flat.push(coords[(i, d)]);
            }
        }

        let mut nodes = Vec::new();
        Self::build_node(&points_flat, dim, (0..n_points).collect(), &mut nodes);

        KdTree {
            nodes,
            points_flat,
            dim,
        }
    }

    /// Recursively builds tree nodes by median splits
    ///
    /// ### Params
    ///
    /// * `points_flat` - All coordinates (flattened).
    /// * `dim` - Number of spatial dimensions.
    /// * `items` - Point indices to split at this node.
    /// * `nodes` - Growing arena of tree nodes.
    ///
    /// ### Returns
    ///
    /// Index of the created node in the arena.
    fn build_node(
        points_flat: &[f64],
        dim: usize,
        items: Vec<usize>,
        nodes: &mut Vec<KdNode>,
    ) -> usize {
        if items.len() <= LEAF_SIZE {
            let node_idx = nodes.len();
            nodes.push(KdNode::Leaf { items });
            return node_idx;
        }

        // split along the axis with the widest spread
        let mut axis = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for d in 0..dim {
            let vals: Vec<f64> = items.iter().map(|&i| points_flat[i * dim + d]).collect();
            let (min_val, max_val) = array_max_min(&vals);
            let spread = max_val - min_val;
            if spread > best_spread {
                best_spread = spread;
                axis = d;
            }
        }

        let mut item_coords: Vec<(usize, f64)> = items
            .iter()
            .map(|&i| (i, points_flat[i * dim + axis]))
            .collect();
        item_coords.sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        // split by sorted order, not by value, so both halves stay non-empty
        // even with heavy ties; left <= threshold <= right
        let mid = item_coords.len() / 2;
        let threshold = item_coords[mid].1;
        let left_items: Vec<usize> = item_coords[..mid].iter().map(|(i, _)| *i).collect();
        let right_items: Vec<usize> = item_coords[mid..].iter().map(|(i, _)| *i).collect();

        let node_idx = nodes.len();
        nodes.push(KdNode::Split {
            axis,
            threshold,
            left: 0,
            right: 0,
        });

        let left_idx = Self::build_node(points_flat, dim, left_items, nodes);
        let right_idx = Self::build_node(points_flat, dim, right_items, nodes);

        if let KdNode::Split {
            ref mut left,
            ref mut right,
            ..
        } = nodes[node_idx]
        {
            *left = left_idx;
            *right = right_idx;
        }

        node_idx
    }

    /// Find every point within `radius` of a query point
    ///
    /// Exact search: a subtree is only skipped when the splitting hyperplane
    /// alone puts all of its points out of range.
    ///
    /// ### Params
    ///
    /// * `query` - Query coordinates, length `dim`.
    /// * `radius` - Inclusive Euclidean distance bound.
    ///
    /// ### Returns
    ///
    /// `(point index, distance)` pairs sorted by point index.
    #[inline]
    pub fn query_radius(&self, query: &[f64], radius: f64) -> Vec<(usize, f64)> {
        let mut hits = Vec::new();
        self.collect_within(0, query, radius, &mut hits);
        hits.sort_unstable_by_key(|&(idx, _)| idx);
        hits
    }

    /// Radius traversal with hyperplane pruning
    ///
    /// ### Params
    ///
    /// * `node_idx` - Current node index.
    /// * `query` - Query coordinates.
    /// * `radius` - Inclusive distance bound.
    /// * `hits` - Accumulating list of in-range points.
    fn collect_within(
        &self,
        node_idx: usize,
        query: &[f64],
        radius: f64,
        hits: &mut Vec<(usize, f64)>,
    ) {
        match &self.nodes[node_idx] {
            KdNode::Leaf { items } => {
                for &item in items {
                    let start = item * self.dim;
                    let mut dist_sq = 0.0;
                    for d in 0..self.dim {
                        let diff = self.points_flat[start + d] - query[d];
                        dist_sq += diff * diff;
                    }
                    let dist = dist_sq.sqrt();
                    if dist <= radius {
                        hits.push((item, dist));
                    }
                }
            }
            KdNode::Split {
                axis,
                threshold,
                left,
                right,
            } => {
                if query[*axis] - radius <= *threshold {
                    self.collect_within(*left, query, radius, hits);
                }
                if query[*axis] + radius >= *threshold {
                    self.collect_within(*right, query, radius, hits);
                }
            }
        }
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;
    use rand::prelude::*;

    fn brute_force(coords: &Mat<f64>, query: &[f64], radius: f64) -> Vec<(usize, f64)> {
        let mut hits = Vec::new();
        for i in 0..coords.nrows() {
            let mut dist_sq = 0.0;
            for d in 0..coords.ncols() {
                let diff = coords[(i, d)] - query[d];
                dist_sq += diff * diff;
            }
            let dist = dist_sq.sqrt();
            if dist <= radius {
                hits.push((i, dist));
            }
        }
        hits
    }

    #[test]
    fn test_query_radius_small() {
        let coords = faer::mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let tree = KdTree::new(coords.as_ref());

        let hits = tree.query_radius(&[0.0, 0.0], 1.0);
        let idx: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(idx, vec![0, 1, 2]);

        // inclusive boundary: sqrt(2) reaches the far corner
        let hits = tree.query_radius(&[0.0, 0.0], 2.0_f64.sqrt());
        assert_eq!(hits.len(), 4);
        assert!((hits[3].1 - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_query_radius_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let coords = Mat::from_fn(500, 2, |_, _| rng.random_range(0.0..10.0));
        let tree = KdTree::new(coords.as_ref());

        for _ in 0..25 {
            let query = [rng.random_range(0.0..10.0), rng.random_range(0.0..10.0)];
            let radius = rng.random_range(0.5..3.0);

            let mut expected = brute_force(&coords, &query, radius);
            expected.sort_unstable_by_key(|&(i, _)| i);
            let hits = tree.query_radius(&query, radius);

            assert_eq!(hits.len(), expected.len());
            for ((i_a, d_a), (i_b, d_b)) in hits.iter().zip(expected.iter()) {
                assert_eq!(i_a, i_b);
                assert!((d_a - d_b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_query_radius_three_dims() {
        let mut rng = StdRng::seed_from_u64(7);
        let coords = Mat::from_fn(200, 3, |_, _| rng.random_range(-5.0..5.0));
        let tree = KdTree::new(coords.as_ref());

        let query = [0.0, 0.0, 0.0];
        let expected = brute_force(&coords, &query, 4.0);
        let hits = tree.query_radius(&query, 4.0);
        assert_eq!(hits.len(), expected.len());
    }

    #[test]
    fn test_duplicate_points() {
        let mut rows = Vec::new();
        for _ in 0..40 {
            rows.push([1.0, 1.0]);
        }
        let coords = Mat::from_fn(40, 2, |i, j| rows[i][j]);
        let tree = KdTree::new(coords.as_ref());

        let hits = tree.query_radius(&[1.0, 1.0], 0.5);
        assert_eq!(hits.len(), 40);
        for (_, d) in hits {
            assert_eq!(d, 0.0);
        }
    }
}
