//! Core compute primitives (Vector, Matrix).
//!
//! These types provide the foundation for every algorithm in the crate.
//! No external linear algebra is used; everything is plain row-major loops.

mod matrix;
mod vector;

pub use matrix::Matrix;
pub use vector::Vector;
