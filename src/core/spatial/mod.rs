//! Spatial machinery: KD-tree indexing and the construction of sparse
//! proximity matrices from coordinates.

pub mod kdtree;
pub mod weights;
