use std::ops::{Index, IndexMut, Mul};

use super::Vector3D;

/// A 3x3 matrix type, used for unit cell representations and fractional
/// coordinate transforms. Data is stored in row major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3([[f64; 3]; 3]);

impl Matrix3 {
    /// Create a new matrix from the given rows
    pub fn new(rows: [[f64; 3]; 3]) -> Matrix3 {
        Matrix3(rows)
    }

    /// Create the null matrix
    pub fn zero() -> Matrix3 {
        Matrix3([[0.0; 3]; 3])
    }

    /// Create the identity matrix
    pub fn one() -> Matrix3 {
        Matrix3([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
    }

    /// Compute the determinant of this matrix
    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Get the transpose of this matrix
    pub fn transposed(&self) -> Matrix3 {
        let m = &self.0;
        Matrix3([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// Compute the inverse of this matrix
    ///
    /// # Panics
    ///
    /// If the matrix is not invertible
    pub fn inverse(&self) -> Matrix3 {
        let determinant = self.determinant();
        assert!(determinant.abs() > 1e-30, "matrix is not invertible");

        let m = &self.0;
        let inv_det = 1.0 / determinant;
        Matrix3([
            [
                inv_det * (m[1][1] * m[2][2] - m[2][1] * m[1][2]),
                inv_det * (m[0][2] * m[2][1] - m[0][1] * m[2][2]),
                inv_det * (m[0][1] * m[1][2] - m[0][2] * m[1][1]),
            ],
            [
                inv_det * (m[1][2] * m[2][0] - m[1][0] * m[2][2]),
                inv_det * (m[0][0] * m[2][2] - m[0][2] * m[2][0]),
                inv_det * (m[1][0] * m[0][2] - m[0][0] * m[1][2]),
            ],
            [
                inv_det * (m[1][0] * m[2][1] - m[2][0] * m[1][1]),
                inv_det * (m[2][0] * m[0][1] - m[0][0] * m[2][1]),
                inv_det * (m[0][0] * m[1][1] - m[1][0] * m[0][1]),
            ],
        ])
    }
}

impl Index<usize> for Matrix3 {
    type Output = [f64; 3];
    #[inline]
    fn index(&self, index: usize) -> &[f64; 3] {
        &self.0[index]
    }
}

impl IndexMut<usize> for Matrix3 {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut [f64; 3] {
        &mut self.0[index]
    }
}

/// Matrix-vector product
impl Mul<Vector3D> for Matrix3 {
    type Output = Vector3D;
    #[inline]
    fn mul(self, v: Vector3D) -> Vector3D {
        Vector3D::new(
            self[0][0] * v[0] + self[0][1] * v[1] + self[0][2] * v[2],
            self[1][0] * v[0] + self[1][1] * v[1] + self[1][2] * v[2],
            self[2][0] * v[0] + self[2][1] * v[1] + self[2][2] * v[2],
        )
    }
}

impl Mul<Matrix3> for Matrix3 {
    type Output = Matrix3;
    fn mul(self, other: Matrix3) -> Matrix3 {
        let mut result = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    result.0[i][j] += self[i][k] * other[k][j];
                }
            }
        }
        return result;
    }
}
