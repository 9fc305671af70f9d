use faer::{Mat, MatRef};
use log::info;
use rustc_hash::FxHashMap;

use crate::core::base::stats::calc_fdr;
use crate::core::base::utils::{col_means, col_nonzero_props, order_matrix, standardize_matrix};
use crate::core::methods::bivariate::{compute_bivariate, BivariateParams};
use crate::core::spatial::weights::{build_weights, WeightParams};
use crate::error::{Result, SpatialError};

////////////////
// Structures //
////////////////

/// A named x/y entity pair, e.g. a ligand and its receptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityPair {
    pub x: String,
    pub y: String,
}

impl EntityPair {
    pub fn new(x: &str, y: &str) -> Self {
        EntityPair {
            x: x.to_string(),
            y: y.to_string(),
        }
    }

    /// Interaction label with the caret separator
    pub fn interaction(&self) -> String {
        format!("{}^{}", self.x, self.y)
    }
}

/// Global-level results for one entity pair
///
/// ### Fields
///
/// * `x_entity`, `y_entity` - The pair's entity names
/// * `interaction` - `x^y` label
/// * `global_stat` - Global spatial association statistic
/// * `global_pval` - Its p-value under the chosen significance method
/// * `global_fdr` - BH-adjusted p-value across all retained pairs
/// * `x_mean`, `x_prop` - Mean and nonzero proportion of the raw x column
/// * `y_mean`, `y_prop` - Same for the y column
#[derive(Clone, Debug)]
pub struct GlobalRecord {
    pub x_entity: String,
    pub y_entity: String,
    pub interaction: String,
    pub global_stat: f64,
    pub global_pval: f64,
    pub global_fdr: f64,
    pub x_mean: f64,
    pub x_prop: f64,
    pub y_mean: f64,
    pub y_prop: f64,
}

/// Full output of the spatial co-expression pipeline
///
/// Column k of the local matrices corresponds to `global_records[k]`.
#[derive(Clone, Debug)]
pub struct CoexpressionResult {
    pub global_records: Vec<GlobalRecord>,
    pub local_stats: Mat<f64>,
    pub local_pvals: Mat<f64>,
}

//////////////
// Pipeline //
//////////////

/// Spatial co-expression over raw primitives
///
/// Orchestrates the full flow for callers holding a named feature matrix,
/// coordinates, and a pair list: prevalence filtering, weight construction,
/// column assembly per pair side, centering, the bivariate engine, and
/// BH adjustment of the global p-values.
///
/// Pairs where either side's nonzero proportion falls below `min_prop` are
/// dropped before any computation; pass 0.0 to keep everything.
///
/// ### Params
///
/// * `expression` - Feature matrix, samples × features, raw scale.
/// * `feature_names` - One name per expression column.
/// * `coordinates` - Spatial coordinates, samples × dimensions.
/// * `pairs` - The entity pairs to score; order defines output order.
/// * `weight_params` - See [`WeightParams`].
/// * `bivar_params` - See [`BivariateParams`].
/// * `min_prop` - Minimum nonzero proportion per pair side, in [0, 1].
///
/// ### Returns
///
/// Global records plus the samples × retained-pairs local statistic and
/// p-value matrices, or a configuration error.
pub fn run_spatial_coexpression(
    expression: MatRef<f64>,
    feature_names: &[String],
    coordinates: MatRef<f64>,
    pairs: &[EntityPair],
    weight_params: &WeightParams,
    bivar_params: &BivariateParams,
    min_prop: f64,
) -> Result<CoexpressionResult> {
    if expression.nrows() != coordinates.nrows() {
        return Err(SpatialError::DimensionMismatch(format!(
            "expression has {} samples, coordinates have {}",
            expression.nrows(),
            coordinates.nrows()
        )));
    }
    if feature_names.len() != expression.ncols() {
        return Err(SpatialError::DimensionMismatch(format!(
            "{} feature names for {} expression columns",
            feature_names.len(),
            expression.ncols()
        )));
    }
    if pairs.is_empty() {
        return Err(SpatialError::InvalidInput(
            "no entity pairs supplied".into(),
        ));
    }
    if !(0.0..=1.0).contains(&min_prop) {
        return Err(SpatialError::InvalidParameter {
            name: "min_prop",
            reason: format!("must lie in [0, 1], got {}", min_prop),
        });
    }

    let positions: FxHashMap<String, usize> = feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();

    // prevalence filter on the raw source columns, before any numeric work
    let feature_props = col_nonzero_props(expression);
    let mut retained: Vec<EntityPair> = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let x_pos = positions
            .get(&pair.x)
            .ok_or_else(|| SpatialError::UnknownFeature(pair.x.clone()))?;
        let y_pos = positions
            .get(&pair.y)
            .ok_or_else(|| SpatialError::UnknownFeature(pair.y.clone()))?;
        if feature_props[*x_pos] >= min_prop && feature_props[*y_pos] >= min_prop {
            retained.push(pair.clone());
        }
    }
    if retained.is_empty() {
        return Err(SpatialError::InvalidInput(format!(
            "no entity pair passes the prevalence filter at min_prop = {}",
            min_prop
        )));
    }
    info!(
        "{} of {} entity pairs pass the prevalence filter",
        retained.len(),
        pairs.len()
    );

    let weights = build_weights(coordinates, None, weight_params)?;

    let x_order: Vec<String> = retained.iter().map(|p| p.x.clone()).collect();
    let y_order: Vec<String> = retained.iter().map(|p| p.y.clone()).collect();
    let x_raw = order_matrix(expression, &positions, &x_order)?;
    let y_raw = order_matrix(expression, &positions, &y_order)?;

    let x_means = col_means(x_raw.as_ref());
    let y_means = col_means(y_raw.as_ref());
    let x_props = col_nonzero_props(x_raw.as_ref());
    let y_props = col_nonzero_props(y_raw.as_ref());

    let x_centered = standardize_matrix(x_raw.as_ref(), true);
    let y_centered = standardize_matrix(y_raw.as_ref(), true);

    let res = compute_bivariate(
        x_centered.as_ref(),
        y_centered.as_ref(),
        &weights,
        bivar_params,
    )?;

    let global_fdrs = calc_fdr(&res.global_pvals);

    let global_records: Vec<GlobalRecord> = retained
        .iter()
        .enumerate()
        .map(|(k, pair)| GlobalRecord {
            x_entity: pair.x.clone(),
            y_entity: pair.y.clone(),
            interaction: pair.interaction(),
            global_stat: res.global_stats[k],
            global_pval: res.global_pvals[k],
            global_fdr: global_fdrs[k],
            x_mean: x_means[k],
            x_prop: x_props[k],
            y_mean: y_means[k],
            y_prop: y_props[k],
        })
        .collect();

    info!(
        "computed spatial co-expression for {} pairs across {} samples",
        global_records.len(),
        expression.nrows()
    );

    Ok(CoexpressionResult {
        global_records,
        local_stats: res.local_stats,
        local_pvals: res.local_pvals,
    })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::synthetic::create_synthetic_spatial_data;
    use faer::mat;

    fn base_weight_params() -> WeightParams {
        WeightParams {
            bandwidth: Some(2.0),
            cutoff: Some(0.1),
            ..Default::default()
        }
    }

    #[test]
    fn test_interaction_label() {
        let pair = EntityPair::new("lig", "rec");
        assert_eq!(pair.interaction(), "lig^rec");
    }

    #[test]
    fn test_end_to_end_synthetic() {
        let _ = env_logger::try_init();

        let data = create_synthetic_spatial_data(8, 2, 2, 0.4, 11);
        let pairs = vec![
            EntityPair::new("ligand_0", "receptor_0"),
            EntityPair::new("ligand_1", "receptor_1"),
            EntityPair::new("ligand_0", "noise_0"),
        ];

        let res = run_spatial_coexpression(
            data.expression.as_ref(),
            &data.feature_names,
            data.coordinates.as_ref(),
            &pairs,
            &base_weight_params(),
            &BivariateParams::default(),
            0.0,
        )
        .unwrap();

        assert_eq!(res.global_records.len(), 3);
        assert_eq!(res.local_stats.nrows(), 64);
        assert_eq!(res.local_stats.ncols(), 3);
        assert_eq!(res.local_pvals.nrows(), 64);
        assert_eq!(res.local_pvals.ncols(), 3);

        let first = &res.global_records[0];
        assert_eq!(first.interaction, "ligand_0^receptor_0");
        assert_eq!(first.x_entity, "ligand_0");
        assert_eq!(first.y_entity, "receptor_0");

        // the co-located bumps carry strong positive spatial association
        for record in &res.global_records[..2] {
            assert!(record.global_stat > 0.0);
            assert!(record.global_pval < 0.05);
        }

        for record in &res.global_records {
            assert!(record.global_fdr >= record.global_pval);
            assert!(record.global_fdr <= 1.0);
            assert!((0.0..=1.0).contains(&record.x_prop));
            assert!((0.0..=1.0).contains(&record.y_prop));
            assert!(record.x_mean >= 0.0);
            assert!(record.y_mean >= 0.0);
        }
    }

    #[test]
    fn test_prevalence_filter() {
        let coords = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let expression = mat![[1.0, 1.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let pairs = vec![EntityPair::new("a", "a"), EntityPair::new("a", "b")];

        let params = WeightParams {
            bandwidth: Some(1.0),
            cutoff: Some(0.01),
            ..Default::default()
        };
        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            coords.as_ref(),
            &pairs,
            &params,
            &BivariateParams::default(),
            0.5,
        )
        .unwrap();

        // feature b sits at prop 0.25 and drops the second pair
        assert_eq!(res.global_records.len(), 1);
        assert_eq!(res.global_records[0].interaction, "a^a");
        assert_eq!(res.local_stats.ncols(), 1);

        let only_b = vec![EntityPair::new("a", "b")];
        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            coords.as_ref(),
            &only_b,
            &params,
            &BivariateParams::default(),
            0.5,
        );
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let coords = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let expression = mat![[1.0], [2.0], [3.0], [4.0]];
        let names = vec!["a".to_string()];
        let pairs = vec![EntityPair::new("a", "zz")];

        let params = WeightParams {
            bandwidth: Some(1.0),
            cutoff: Some(0.01),
            ..Default::default()
        };
        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            coords.as_ref(),
            &pairs,
            &params,
            &BivariateParams::default(),
            0.0,
        );
        assert!(matches!(res, Err(SpatialError::UnknownFeature(name)) if name == "zz"));
    }

    #[test]
    fn test_input_validation() {
        let coords = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let expression = mat![[1.0], [2.0], [3.0], [4.0]];
        let names = vec!["a".to_string()];
        let pairs = vec![EntityPair::new("a", "a")];
        let params = WeightParams {
            bandwidth: Some(1.0),
            cutoff: Some(0.01),
            ..Default::default()
        };

        let short_coords = mat![[0.0, 0.0], [1.0, 0.0]];
        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            short_coords.as_ref(),
            &pairs,
            &params,
            &BivariateParams::default(),
            0.0,
        );
        assert!(matches!(res, Err(SpatialError::DimensionMismatch(_))));

        let bad_names = vec!["a".to_string(), "b".to_string()];
        let res = run_spatial_coexpression(
            expression.as_ref(),
            &bad_names,
            coords.as_ref(),
            &pairs,
            &params,
            &BivariateParams::default(),
            0.0,
        );
        assert!(matches!(res, Err(SpatialError::DimensionMismatch(_))));

        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            coords.as_ref(),
            &[],
            &params,
            &BivariateParams::default(),
            0.0,
        );
        assert!(matches!(res, Err(SpatialError::InvalidInput(_))));

        let res = run_spatial_coexpression(
            expression.as_ref(),
            &names,
            coords.as_ref(),
            &pairs,
            &params,
            &BivariateParams::default(),
            1.5,
        );
        assert!(matches!(
            res,
            Err(SpatialError::InvalidParameter {
                name: "min_prop",
                ..
            })
        ));
    }
}
