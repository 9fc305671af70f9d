//! Core functionality of the crate: statistical primitives, sparse data
//! structures, spatial indexing and the co-expression methods built on top.

pub mod base;
pub mod data;
pub mod methods;
pub mod spatial;
