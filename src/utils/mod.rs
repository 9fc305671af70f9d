//! Small generic helpers shared across the crate

pub mod general;
