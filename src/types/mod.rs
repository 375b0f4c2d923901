//! This module provides the small 3D vector and matrix types used everywhere
//! else in this crate.

mod vectors;
pub use self::vectors::Vector3D;

mod matrix;
pub use self::matrix::Matrix3;
