//! Spatial co-expression statistics on sparse proximity graphs.
//!
//! `spacor` computes bivariate spatial association between pairs of features
//! measured on the same set of spatial locations, for example ligand and
//! receptor transcripts on the spots of a spatial transcriptomics slide. The
//! crate covers the full workflow:
//!
//! - **Proximity weights.** Kernel-smoothed sparse weight matrices built
//!   from spatial coordinates via a KD-tree radius search, see
//!   [`build_weights`].
//! - **Bivariate statistics.** Global and local bivariate Moran-type
//!   statistics with analytical or permutation-based significance, see
//!   [`compute_bivariate`].
//! - **Pipeline.** Feature lookup, prevalence filtering, standardisation
//!   and multiple-testing correction wrapped into a single entry point, see
//!   [`run_spatial_coexpression`].

pub mod core;
pub mod error;
pub mod utils;

pub use crate::error::{Result, SpatialError};

pub use crate::core::base::kernels::{parse_kernel_type, KernelType};
pub use crate::core::base::stats::{calc_fdr, get_test_alternative, TestAlternative};
pub use crate::core::data::sparse_structures::{ProximityMatrix, WeightPrecision};
pub use crate::core::data::synthetic::{create_synthetic_spatial_data, SyntheticSpatialData};
pub use crate::core::methods::bivariate::{
    compute_bivariate, parse_significance_method, BivariateParams, BivariateResult,
    SignificanceMethod,
};
pub use crate::core::methods::pipeline::{
    run_spatial_coexpression, CoexpressionResult, EntityPair, GlobalRecord,
};
pub use crate::core::spatial::weights::{build_weights, WeightParams};
