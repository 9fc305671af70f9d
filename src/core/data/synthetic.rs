use faer::Mat;
use rand::prelude::*;
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;

use crate::utils::general::nested_vector_to_faer_mat;

/// Peak expression of the spatial signal bumps
const SIGNAL_AMPLITUDE: f64 = 5.0;

/// Mean count of the unstructured noise features
const NOISE_LAMBDA: f64 = 0.5;

////////////////
// Structures //
////////////////

/// Synthetic spatial expression data for tests and benchmarks
///
/// ### Fields
///
/// * `coordinates` - Grid coordinates, samples × 2
/// * `expression` - Expression matrix, samples × features, non-negative
/// * `feature_names` - Column names: `ligand_p`/`receptor_p` per signal pair
///   followed by `noise_q` features
#[derive(Clone, Debug)]
pub struct SyntheticSpatialData {
    pub coordinates: Mat<f64>,
    pub expression: Mat<f64>,
    pub feature_names: Vec<String>,
}

/////////////////
// Generation  //
/////////////////

/// Generate a seeded spatial co-expression data set
///
/// Samples sit on a `grid_side` × `grid_side` unit grid. Each signal pair
/// shares one smooth Gaussian bump placed at a seeded random location; the
/// ligand column is the bump plus Gaussian noise, the receptor column a
/// slightly damped copy with independent noise, both clipped at zero.
/// Noise features are Poisson counts with no spatial structure. Each feature
/// column derives from its own sub-seeded RNG so generation parallelizes
/// without losing reproducibility.
///
/// ### Params
///
/// * `grid_side` - Number of grid points per axis.
/// * `n_signal_pairs` - Number of co-expressed ligand/receptor pairs.
/// * `n_noise_features` - Number of unstructured noise features.
/// * `noise_sd` - Standard deviation of the additive noise on the signal
///   features.
/// * `seed` - Seed for reproducibility.
///
/// ### Returns
///
/// The synthetic data set with `grid_side²` samples and
/// `2 * n_signal_pairs + n_noise_features` features.
pub fn create_synthetic_spatial_data(
    grid_side: usize,
    n_signal_pairs: usize,
    n_noise_features: usize,
    noise_sd: f64,
    seed: u64,
) -> SyntheticSpatialData {
    let n_samples = grid_side * grid_side;
    let n_features = 2 * n_signal_pairs + n_noise_features;
    let bump_width = (grid_side as f64 / 4.0).max(1.0);

    let coordinates = Mat::from_fn(n_samples, 2, |s, d| {
        if d == 0 {
            (s % grid_side) as f64
        } else {
            (s / grid_side) as f64
        }
    });

    // bump centres come from the master seed; feature noise from sub-seeds
    let mut rng = StdRng::seed_from_u64(seed);
    let centres: Vec<(f64, f64)> = (0..n_signal_pairs)
        .map(|_| {
            (
                rng.random_range(0.0..grid_side as f64),
                rng.random_range(0.0..grid_side as f64),
            )
        })
        .collect();

    let columns: Vec<Vec<f64>> = (0..n_features)
        .into_par_iter()
        .map(|f| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(f as u64 + 1));

            if f < 2 * n_signal_pairs {
                let (cx, cy) = centres[f / 2];
                let damp = if f % 2 == 0 { 1.0 } else { 0.8 };
                let normal = Normal::new(0.0, noise_sd).unwrap();

                (0..n_samples)
                    .map(|s| {
                        let x = (s % grid_side) as f64;
                        let y = (s / grid_side) as f64;
                        let dist_sq = (x - cx).powi(2) + (y - cy).powi(2);
                        let bump = SIGNAL_AMPLITUDE
                            * damp
                            * (-dist_sq / (2.0 * bump_width * bump_width)).exp();
                        (bump + normal.sample(&mut rng)).max(0.0)
                    })
                    .collect()
            } else {
                let poi = Poisson::new(NOISE_LAMBDA).unwrap();
                (0..n_samples).map(|_| poi.sample(&mut rng)).collect()
            }
        })
        .collect();

    let expression = nested_vector_to_faer_mat(columns, true);

    let mut feature_names = Vec::with_capacity(n_features);
    for p in 0..n_signal_pairs {
        feature_names.push(format!("ligand_{}", p));
        feature_names.push(format!("receptor_{}", p));
    }
    for q in 0..n_noise_features {
        feature_names.push(format!("noise_{}", q));
    }

    SyntheticSpatialData {
        coordinates,
        expression,
        feature_names,
    }
}

///////////
// Tests //
///////////
