//! The spatial co-expression methods: the bivariate statistic engine and
//! the orchestrating pipeline.

pub mod bivariate;
pub mod pipeline;
