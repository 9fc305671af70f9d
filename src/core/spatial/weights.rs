use faer::MatRef;
use log::debug;
use rayon::prelude::*;
use std::time::Instant;

use crate::core::base::kernels::{apply_kernel, KernelType};
use crate::core::data::sparse_structures::ProximityMatrix;
use crate::core::spatial::kdtree::KdTree;
use crate::error::{Result, SpatialError};

////////////
// Params //
////////////

/// Parameters for spatial weight construction
///
/// ### Fields
///
/// * `bandwidth` - Kernel decay length. Required, no sensible default
///   exists across tissues/platforms.
/// * `cutoff` - Weights at or below this value are pruned from the sparse
///   structure. Required.
/// * `kernel` - Distance → weight transform, see [`KernelType`].
/// * `max_dist_ratio` - Pairs farther apart than `bandwidth * max_dist_ratio`
///   are never materialized.
/// * `set_diag` - Store explicit diagonal entries with weight 1.0 (self mode
///   only).
/// * `zone_of_indifference` - Distances strictly below this are pushed to
///   infinity before the kernel, zeroing out immediate neighbours.
/// * `standardize` - L1-normalize each row to sum 1.
/// * `single_precision_threshold` - Past this many stored entries the weights
///   are rounded through f32.
#[derive(Clone, Debug)]
pub struct WeightParams {
    pub bandwidth: Option<f64>,
    pub cutoff: Option<f64>,
    pub kernel: KernelType,
    pub max_dist_ratio: f64,
    pub set_diag: bool,
    pub zone_of_indifference: f64,
    pub standardize: bool,
    pub single_precision_threshold: usize,
}

impl Default for WeightParams {
    fn default() -> Self {
        WeightParams {
            bandwidth: None,
            cutoff: None,
            kernel: KernelType::Gaussian,
            max_dist_ratio: 3.0,
            set_diag: false,
            zone_of_indifference: 0.0,
            standardize: false,
            single_precision_threshold: 1000,
        }
    }
}

/////////////
// Helpers //
/////////////

/// Validates the parameter set before any numeric work
///
/// ### Params
///
/// * `params` - The weight parameters to check.
///
/// ### Returns
///
/// The unwrapped `(bandwidth, cutoff)` pair, or the configuration error.
fn validate_weight_params(params: &WeightParams) -> Result<(f64, f64)> {
    let bandwidth = params
        .bandwidth
        .ok_or(SpatialError::MissingParameter("bandwidth"))?;
    let cutoff = params
        .cutoff
        .ok_or(SpatialError::MissingParameter("cutoff"))?;

    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(SpatialError::InvalidParameter {
            name: "bandwidth",
            reason: format!("must be finite and positive, got {}", bandwidth),
        });
    }
    if !cutoff.is_finite() {
        return Err(SpatialError::InvalidParameter {
            name: "cutoff",
            reason: format!("must be finite, got {}", cutoff),
        });
    }
    if !params.max_dist_ratio.is_finite() || params.max_dist_ratio <= 0.0 {
        return Err(SpatialError::InvalidParameter {
            name: "max_dist_ratio",
            reason: format!("must be finite and positive, got {}", params.max_dist_ratio),
        });
    }
    if !params.zone_of_indifference.is_finite() || params.zone_of_indifference < 0.0 {
        return Err(SpatialError::InvalidParameter {
            name: "zone_of_indifference",
            reason: format!(
                "must be finite and non-negative, got {}",
                params.zone_of_indifference
            ),
        });
    }

    Ok((bandwidth, cutoff))
}

/// Rejects coordinate matrices containing NaN or infinite values
///
/// The KD-tree sorts points by their coordinates, so non-finite values must
/// be caught before construction.
///
/// ### Params
///
/// * `coords` - The coordinate matrix to check.
/// * `label` - Which matrix this is, used in the error message.
///
/// ### Returns
///
/// `Ok(())`, or the input error naming the first offending entry.
fn validate_coordinates(coords: MatRef<f64>, label: &'static str) -> Result<()> {
    for i in 0..coords.nrows() {
        for d in 0..coords.ncols() {
            if !coords[(i, d)].is_finite() {
                return Err(SpatialError::InvalidInput(format!(
                    "{} coordinate matrix contains a non-finite value at ({}, {})",
                    label, i, d
                )));
            }
        }
    }
    Ok(())
}

/////////////
// Builder //
/////////////

/// Build a sparse proximity matrix from spatial coordinates
///
/// Enumerates sample pairs within `bandwidth * max_dist_ratio` through a
/// KD-tree, applies the zone of indifference and the kernel transform to the
/// stored distances, prunes weights at or below the cutoff, and optionally
/// row-standardizes. With a reference set the distances run from reference
/// points to the primary set and the result is transposed, so returned rows
/// always align with the primary coordinates. Fully deterministic: two calls
/// with identical inputs return bit-identical structures.
///
/// ### Params
///
/// * `coordinates` - Primary coordinate matrix, samples × dimensions.
/// * `reference` - Optional second coordinate set. When given, the result is
///   rectangular with one column per reference point.
/// * `params` - See [`WeightParams`].
///
/// ### Returns
///
/// The proximity matrix, N×N in self mode or N×M against a reference set.
pub fn build_weights(
    coordinates: MatRef<f64>,
    reference: Option<MatRef<f64>>,
    params: &WeightParams,
) -> Result<ProximityMatrix> {
    let (bandwidth, cutoff) = validate_weight_params(params)?;

    if coordinates.nrows() == 0 || coordinates.ncols() == 0 {
        return Err(SpatialError::InvalidInput(
            "coordinate matrix must have at least one sample and one dimension".into(),
        ));
    }
    validate_coordinates(coordinates, "primary")?;
    if let Some(ref_coords) = reference {
        if ref_coords.ncols() != coordinates.ncols() {
            return Err(SpatialError::DimensionMismatch(format!(
                "reference coordinates have {} dimensions, primary coordinates have {}",
                ref_coords.ncols(),
                coordinates.ncols()
            )));
        }
        if ref_coords.nrows() == 0 {
            return Err(SpatialError::InvalidInput(
                "reference coordinate matrix must have at least one sample".into(),
            ));
        }
        validate_coordinates(ref_coords, "reference")?;
    }

    let self_mode = reference.is_none();
    let query_coords = reference.unwrap_or(coordinates);
    let dim = coordinates.ncols();
    let max_distance = bandwidth * params.max_dist_ratio;

    let start = Instant::now();
    let tree = KdTree::new(coordinates);

    // sparse distance rows; zero distances (self pairs and coincident
    // points) are never stored, the diagonal is handled via set_diag
    let mut rows: Vec<Vec<(usize, f64)>> = (0..query_coords.nrows())
        .into_par_iter()
        .map(|i| {
            let query: Vec<f64> = (0..dim).map(|d| query_coords[(i, d)]).collect();
            tree.query_radius(&query, max_distance)
                .into_iter()
                .filter(|&(_, d)| d > 0.0)
                .collect()
        })
        .collect();
    debug!(
        "enumerated neighbours within {:.4} for {} query points in {:?}",
        max_distance,
        query_coords.nrows(),
        start.elapsed()
    );

    if params.zone_of_indifference > 0.0 {
        for row in rows.iter_mut() {
            for entry in row.iter_mut() {
                if entry.1 < params.zone_of_indifference {
                    entry.1 = f64::INFINITY;
                }
            }
        }
    }

    // the diagonal sits at distance zero and is exempt from the dead zone
    if self_mode && params.set_diag {
        for (i, row) in rows.iter_mut().enumerate() {
            let pos = row.partition_point(|&(j, _)| j < i);
            row.insert(pos, (i, 0.0));
        }
    }

    let dists_flat: Vec<f64> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&(_, d)| d))
        .collect();
    let weights_flat = apply_kernel(&dists_flat, &params.kernel, &bandwidth);

    let mut offset = 0;
    for row in rows.iter_mut() {
        for (entry, w) in row.iter_mut().zip(&weights_flat[offset..]) {
            entry.1 = *w;
        }
        offset += row.len();
    }

    let mut weights = ProximityMatrix::from_rows(rows, coordinates.nrows());
    weights.prune(cutoff);

    if params.standardize {
        weights.l1_normalize_rows();
    }

    let mut weights = if self_mode {
        weights
    } else {
        weights.transpose()
    };

    if weights.nnz() > params.single_precision_threshold {
        weights.round_to_f32();
    }

    debug!(
        "proximity matrix {:?} with {} stored weights ({:?})",
        weights.shape,
        weights.nnz(),
        weights.precision
    );

    Ok(weights)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::sparse_structures::WeightPrecision;
    use faer::Mat;
    use rand::prelude::*;

    const EPS: f64 = 1e-12;

    fn unit_square() -> Mat<f64> {
        faer::mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]
    }

    fn base_params() -> WeightParams {
        WeightParams {
            bandwidth: Some(1.0),
            cutoff: Some(0.01),
            ..Default::default()
        }
    }

    #[test]
    fn test_unit_square_gaussian() {
        let coords = unit_square();
        let weights = build_weights(coords.as_ref(), None, &base_params()).unwrap();

        assert_eq!(weights.shape, (4, 4));
        assert!(weights.is_square());
        assert_eq!(weights.nnz(), 12);
        assert_eq!(weights.precision, WeightPrecision::Double);

        let dense = weights.to_dense();
        let w_side = (-0.5_f64).exp();
        let w_diag = (-1.0_f64).exp();
        assert!((dense[(0, 1)] - w_side).abs() < EPS);
        assert!((dense[(0, 2)] - w_side).abs() < EPS);
        assert!((dense[(0, 3)] - w_diag).abs() < EPS);
        assert_eq!(dense[(0, 0)], 0.0);

        // symmetric in self mode
        for i in 0..4 {
            for j in 0..4 {
                assert!((dense[(i, j)] - dense[(j, i)]).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_rebuild_is_bit_identical() {
        let mut rng = StdRng::seed_from_u64(99);
        let coords = Mat::from_fn(300, 2, |_, _| rng.random_range(0.0..10.0));

        let params = WeightParams {
            bandwidth: Some(0.8),
            cutoff: Some(0.05),
            standardize: true,
            ..Default::default()
        };
        let a = build_weights(coords.as_ref(), None, &params).unwrap();
        let b = build_weights(coords.as_ref(), None, &params).unwrap();

        assert_eq!(a.data, b.data);
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.indptr, b.indptr);
        assert_eq!(a.precision, b.precision);
    }

    #[test]
    fn test_cutoff_prunes() {
        let coords = unit_square();
        let params = WeightParams {
            cutoff: Some(0.5),
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();

        // exp(-1) for the diagonal pairs falls at 0.368 <= 0.5
        assert_eq!(weights.nnz(), 8);
        for w in &weights.data {
            assert!(*w > 0.5);
        }
    }

    #[test]
    fn test_standardize_rows() {
        // four connected corners plus one point out of range
        let coords = faer::mat![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [100.0, 100.0]
        ];
        let params = WeightParams {
            standardize: true,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();

        let sums = weights.row_sums();
        for i in 0..4 {
            assert!((sums[i] - 1.0).abs() < 1e-9);
        }
        assert_eq!(sums[4], 0.0);
    }

    #[test]
    fn test_zone_of_indifference() {
        let coords = faer::mat![[0.0, 0.0], [0.5, 0.0], [2.0, 0.0]];
        let params = WeightParams {
            cutoff: Some(0.0),
            zone_of_indifference: 1.0,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();
        let dense = weights.to_dense();

        // the 0.5 pair falls inside the dead zone, the others survive
        assert_eq!(dense[(0, 1)], 0.0);
        assert_eq!(dense[(1, 0)], 0.0);
        assert!((dense[(0, 2)] - (-2.0_f64).exp()).abs() < EPS);
        assert!((dense[(1, 2)] - (-1.125_f64).exp()).abs() < EPS);
    }

    #[test]
    fn test_set_diag() {
        let coords = unit_square();
        let params = WeightParams {
            set_diag: true,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();

        assert_eq!(weights.nnz(), 16);
        let dense = weights.to_dense();
        for i in 0..4 {
            assert_eq!(dense[(i, i)], 1.0);
        }
    }

    #[test]
    fn test_set_diag_survives_dead_zone() {
        let coords = faer::mat![[0.0, 0.0], [0.3, 0.0]];
        let params = WeightParams {
            cutoff: Some(0.0),
            set_diag: true,
            zone_of_indifference: 0.5,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();

        // only the two diagonal entries remain
        assert_eq!(weights.nnz(), 2);
        let dense = weights.to_dense();
        assert_eq!(dense[(0, 0)], 1.0);
        assert_eq!(dense[(1, 1)], 1.0);
        assert_eq!(dense[(0, 1)], 0.0);
    }

    #[test]
    fn test_precision_threshold() {
        let coords = unit_square();

        let params = WeightParams {
            single_precision_threshold: 10,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();
        assert_eq!(weights.precision, WeightPrecision::Single);
        let w_side = (-0.5_f64).exp();
        assert_eq!(weights.to_dense()[(0, 1)], w_side as f32 as f64);

        // threshold counts strictly greater
        let params = WeightParams {
            single_precision_threshold: 12,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), None, &params).unwrap();
        assert_eq!(weights.precision, WeightPrecision::Double);
    }

    #[test]
    fn test_reference_mode() {
        let coords = unit_square();
        let reference = faer::mat![[0.5, 0.0], [10.0, 10.0]];
        let weights = build_weights(coords.as_ref(), Some(reference.as_ref()), &base_params())
            .unwrap();

        // rows align with the primary set, columns with the reference set
        assert_eq!(weights.shape, (4, 2));
        assert_eq!(weights.nnz(), 4);

        let dense = weights.to_dense();
        assert!((dense[(0, 0)] - (-0.125_f64).exp()).abs() < EPS);
        assert!((dense[(2, 0)] - (-0.625_f64).exp()).abs() < EPS);
        assert_eq!(dense[(0, 1)], 0.0);
    }

    #[test]
    fn test_reference_mode_standardized_columns() {
        let coords = unit_square();
        let reference = faer::mat![[0.5, 0.0], [10.0, 10.0]];
        let params = WeightParams {
            standardize: true,
            ..base_params()
        };
        let weights = build_weights(coords.as_ref(), Some(reference.as_ref()), &params).unwrap();

        // normalization ran on the reference side before the transpose
        let dense = weights.to_dense();
        let col0: f64 = (0..4).map(|i| dense[(i, 0)]).sum();
        let col1: f64 = (0..4).map(|i| dense[(i, 1)]).sum();
        assert!((col0 - 1.0).abs() < 1e-9);
        assert_eq!(col1, 0.0);
    }

    #[test]
    fn test_parameter_validation() {
        let coords = unit_square();

        let params = WeightParams {
            cutoff: Some(0.01),
            ..Default::default()
        };
        let res = build_weights(coords.as_ref(), None, &params);
        assert!(matches!(res, Err(SpatialError::MissingParameter("bandwidth"))));

        let params = WeightParams {
            bandwidth: Some(1.0),
            ..Default::default()
        };
        let res = build_weights(coords.as_ref(), None, &params);
        assert!(matches!(res, Err(SpatialError::MissingParameter("cutoff"))));

        let params = WeightParams {
            bandwidth: Some(-2.0),
            ..base_params()
        };
        let res = build_weights(coords.as_ref(), None, &params);
        assert!(matches!(
            res,
            Err(SpatialError::InvalidParameter { name: "bandwidth", .. })
        ));

        let reference = faer::mat![[0.0, 0.0, 0.0]];
        let res = build_weights(coords.as_ref(), Some(reference.as_ref()), &base_params());
        assert!(matches!(res, Err(SpatialError::DimensionMismatch(_))));

        let empty: Mat<f64> = Mat::zeros(0, 2);
        let res = build_weights(empty.as_ref(), None, &base_params());
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let coords = faer::mat![[0.0, 0.0], [1.0, 0.0], [0.0, f64::NAN], [1.0, 1.0]];
        let res = build_weights(coords.as_ref(), None, &base_params());
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));

        let coords = faer::mat![[0.0, 0.0], [f64::INFINITY, 0.0]];
        let res = build_weights(coords.as_ref(), None, &base_params());
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));

        // a bad reference set is caught as well, the primary set alone
        // would pass
        let coords = unit_square();
        let reference = faer::mat![[f64::NAN, 0.0]];
        let res = build_weights(coords.as_ref(), Some(reference.as_ref()), &base_params());
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));
    }
}
