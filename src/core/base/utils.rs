use faer::{Mat, MatRef};
use rustc_hash::FxHashMap;

use crate::error::{Result, SpatialError};

////////////////////
// Column moments //
////////////////////

/// Calculates the column means of a matrix
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise means
///
/// ### Returns
///
/// Vector of the column means.
pub fn col_means(mat: MatRef<f64>) -> Vec<f64> {
    let n_rows = mat.nrows();
    let ones = Mat::from_fn(n_rows, 1, |_, _| 1.0);
    let means = (ones.transpose() * mat) / n_rows as f64;

    means.row(0).iter().cloned().collect()
}

/// Calculate the column sample variances
///
/// Single pass per column (Welford), denominator `n - 1`.
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise variances
///
/// ### Returns
///
/// Vector of the column sample variances.
pub fn col_sample_vars(mat: MatRef<f64>) -> Vec<f64> {
    let n = mat.nrows() as f64;
    let n_cols = mat.ncols();

    (0..n_cols)
        .map(|j| {
            let mut mean = 0.0;
            let mut m2 = 0.0;
            let mut count = 0.0;

            for i in 0..mat.nrows() {
                count += 1.0;
                let delta = mat[(i, j)] - mean;
                mean += delta / count;
                let delta2 = mat[(i, j)] - mean;
                m2 += delta * delta2;
            }
            m2 / (n - 1.0)
        })
        .collect()
}

/// Calculate the column L2 norms
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise L2 norms
///
/// ### Returns
///
/// Vector of the column L2 norms.
pub fn col_l2_norms(mat: MatRef<f64>) -> Vec<f64> {
    (0..mat.ncols()).map(|j| mat.col(j).norm_l2()).collect()
}

/// Calculate the fraction of positive entries per column
///
/// The prevalence of a feature: the fraction of samples in which its value
/// is strictly above zero.
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise proportions
///
/// ### Returns
///
/// Vector of per-column proportions in [0, 1].
pub fn col_nonzero_props(mat: MatRef<f64>) -> Vec<f64> {
    let n_rows = mat.nrows();
    (0..mat.ncols())
        .map(|j| {
            let positive = (0..n_rows).filter(|&i| mat[(i, j)] > 0.0).count();
            positive as f64 / n_rows as f64
        })
        .collect()
}

/////////////////////
// Matrix assembly //
/////////////////////

/// Center a matrix column-wise, optionally rescaling to unit L2 norm
///
/// With `local = true` the columns are only centered; the data scale is kept
/// for the local statistics. With `local = false` each centered column is
/// additionally rescaled to unit L2 norm, the normalization baseline of the
/// global statistic. Zero-variance columns come back as all-zero columns,
/// never NaN.
///
/// ### Params
///
/// * `mat` - The matrix to standardize (samples in rows)
/// * `local` - Centering only (`true`) or centering plus L2 rescaling
///   (`false`)
///
/// ### Returns
///
/// The standardized matrix.
pub fn standardize_matrix(mat: MatRef<f64>, local: bool) -> Mat<f64> {
    let n_rows = mat.nrows();
    let n_cols = mat.ncols();

    let means = col_means(mat);

    let mut result = mat.to_owned();
    for j in 0..n_cols {
        let mean = means[j];
        for i in 0..n_rows {
            result[(i, j)] -= mean;
        }
    }

    if local {
        return result;
    }

    for j in 0..n_cols {
        let norm = result.col(j).norm_l2();
        if norm > 1e-10 {
            for i in 0..n_rows {
                result[(i, j)] /= norm;
            }
        }
    }

    result
}

/// Select and repeat source columns according to an ordered name list
///
/// Builds the per-side expression matrix of an entity-pair table: column k of
/// the output is the source column of the k-th name in `order`. Duplicates
/// are allowed and resolved per occurrence.
///
/// ### Params
///
/// * `source` - The feature matrix (samples in rows)
/// * `positions` - Mapping from feature name to its column in `source`
/// * `order` - The ordered, possibly repeating, feature names to select
///
/// ### Returns
///
/// The reordered matrix, or an error for names missing from `positions`.
pub fn order_matrix(
    source: MatRef<f64>,
    positions: &FxHashMap<String, usize>,
    order: &[String],
) -> Result<Mat<f64>> {
    let mut selected = Vec::with_capacity(order.len());
    for name in order {
        let idx = positions
            .get(name)
            .ok_or_else(|| SpatialError::UnknownFeature(name.clone()))?;
        if *idx >= source.ncols() {
            return Err(SpatialError::DimensionMismatch(format!(
                "feature `{}` maps to column {} but the matrix has {} columns",
                name,
                idx,
                source.ncols()
            )));
        }
        selected.push(*idx);
    }

    Ok(Mat::from_fn(source.nrows(), selected.len(), |i, k| {
        source[(i, selected[k])]
    }))
}

///////////
// Tests //
///////////
