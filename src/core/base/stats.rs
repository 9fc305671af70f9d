use rayon::prelude::*;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/////////////////////
// Enums | Helpers //
/////////////////////

#[derive(Clone, Debug)]
pub enum TestAlternative {
    /// Two sided test for the Z-score
    TwoSided,
    /// One-sided test for greater than
    Greater,
    /// One-sided test for lesser than
    Less,
}

/// Helper function to get the test alternative
///
/// ### Params
///
/// * `s` - String, type of test to run.
///
/// ### Returns
///
/// Option of the `TestAlternative`
pub fn get_test_alternative(s: &str) -> Option<TestAlternative> {
    match s.to_lowercase().as_str() {
        "greater" => Some(TestAlternative::Greater),
        "less" => Some(TestAlternative::Less),
        "twosided" => Some(TestAlternative::TwoSided),
        _ => None,
    }
}

///////////////
// Functions //
///////////////

/// Transform Z-scores into p-values (assuming normality).
///
/// Uses the standard normal CDF, switching to a pdf-based tail approximation
/// beyond |z| > 6 where the CDF saturates.
///
/// ### Params
///
/// * `z_scores` - The Z scores to transform to p-values
/// * `test_alternative` - Which tail(s) to evaluate
///
/// ### Returns
///
/// The p-value vector based on the Z scores
pub fn z_scores_to_pvals(z_scores: &[f64], test_alternative: &TestAlternative) -> Vec<f64> {
    let normal = Normal::new(0.0, 1.0).unwrap();
    z_scores
        .iter()
        .map(|&z| match test_alternative {
            TestAlternative::TwoSided => {
                let abs_z = z.abs();
                if abs_z > 6.0 {
                    let pdf = normal.pdf(abs_z);
                    let p = pdf / abs_z * (1.0 - 1.0 / (abs_z * abs_z));
                    2.0 * p
                } else {
                    2.0 * (1.0 - normal.cdf(abs_z))
                }
            }
            TestAlternative::Greater => {
                if z > 6.0 {
                    let pdf = normal.pdf(z);
                    pdf / z * (1.0 - 1.0 / (z * z))
                } else {
                    1.0 - normal.cdf(z)
                }
            }
            TestAlternative::Less => {
                if z < -6.0 {
                    let abs_z = z.abs();
                    let pdf = normal.pdf(abs_z);
                    pdf / abs_z * (1.0 - 1.0 / (abs_z * abs_z))
                } else {
                    normal.cdf(z)
                }
            }
        })
        .collect()
}

/// Calculate the FDR
///
/// Benjamini-Hochberg adjustment with monotonicity enforced from the largest
/// p-value downwards.
///
/// ### Params
///
/// * `pvals` - P-values for which to calculate the FDR
///
/// ### Returns
///
/// The calculated FDRs
pub fn calc_fdr(pvals: &[f64]) -> Vec<f64> {
    let n = pvals.len();
    if n == 0 {
        return Vec::new();
    }
    let n_f64 = n as f64;

    let mut indexed_pval: Vec<(usize, f64)> =
        pvals.par_iter().enumerate().map(|(i, &x)| (i, x)).collect();

    indexed_pval
        .sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let adj_pvals_tmp: Vec<f64> = indexed_pval
        .par_iter()
        .enumerate()
        .map(|(i, (_, p))| (n_f64 / (i + 1) as f64) * p)
        .collect();

    let mut current_min = adj_pvals_tmp[n - 1].min(1.0);
    let mut monotonic_adj = vec![current_min; n];

    for i in (0..n - 1).rev() {
        current_min = current_min.min(adj_pvals_tmp[i]).min(1.0);
        monotonic_adj[i] = current_min;
    }

    let mut adj_pvals = vec![0.0; n];

    for (i, &(original_idx, _)) in indexed_pval.iter().enumerate() {
        adj_pvals[original_idx] = monotonic_adj[i];
    }

    adj_pvals
}

///////////
// Tests //
///////////
