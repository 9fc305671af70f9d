//! Module containing the sparse data structures and synthetic data
//! generation.

pub mod sparse_structures;
pub mod synthetic;
