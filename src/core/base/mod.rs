//! Module containing the statistical building blocks: distance kernels,
//! p-value machinery and column-wise matrix helpers.

pub mod kernels;
pub mod stats;
pub mod utils;
