use std::ops::{Add, AddAssign, Sub, SubAssign, Mul, MulAssign, Div, Neg, BitXor};
use std::ops::{Index, IndexMut};

/// A 3-dimensional vector type, implementing all usual operations.
///
/// The product of two vectors (`u * v`) is their scalar product, and the
/// `u ^ v` operator is the cross product.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3D([f64; 3]);

impl Vector3D {
    /// Create a new vector with components `x`, `y`, `z`
    pub fn new(x: f64, y: f64, z: f64) -> Vector3D {
        Vector3D([x, y, z])
    }

    /// Create the null vector
    pub fn zero() -> Vector3D {
        Vector3D([0.0, 0.0, 0.0])
    }

    /// Get the squared euclidean norm of this vector
    pub fn norm2(&self) -> f64 {
        self * self
    }

    /// Get the euclidean norm of this vector
    pub fn norm(&self) -> f64 {
        f64::sqrt(self.norm2())
    }

    /// Get a normalized copy of this vector
    pub fn normalized(&self) -> Vector3D {
        *self / self.norm()
    }
}

impl From<[f64; 3]> for Vector3D {
    fn from(array: [f64; 3]) -> Vector3D {
        Vector3D(array)
    }
}

impl Index<usize> for Vector3D {
    type Output = f64;
    #[inline]
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for Vector3D {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl Add for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn add(self, other: Vector3D) -> Vector3D {
        Vector3D([self[0] + other[0], self[1] + other[1], self[2] + other[2]])
    }
}

impl AddAssign for Vector3D {
    #[inline]
    fn add_assign(&mut self, other: Vector3D) {
        self.0[0] += other[0];
        self.0[1] += other[1];
        self.0[2] += other[2];
    }
}

impl Sub for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn sub(self, other: Vector3D) -> Vector3D {
        Vector3D([self[0] - other[0], self[1] - other[1], self[2] - other[2]])
    }
}

impl SubAssign for Vector3D {
    #[inline]
    fn sub_assign(&mut self, other: Vector3D) {
        self.0[0] -= other[0];
        self.0[1] -= other[1];
        self.0[2] -= other[2];
    }
}

impl Neg for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn neg(self) -> Vector3D {
        Vector3D([-self[0], -self[1], -self[2]])
    }
}

/// Scalar product between two vectors
impl Mul<Vector3D> for Vector3D {
    type Output = f64;
    #[inline]
    fn mul(self, other: Vector3D) -> f64 {
        self[0] * other[0] + self[1] * other[1] + self[2] * other[2]
    }
}

/// Scalar product between two vector references
impl Mul<&Vector3D> for &Vector3D {
    type Output = f64;
    #[inline]
    fn mul(self, other: &Vector3D) -> f64 {
        self[0] * other[0] + self[1] * other[1] + self[2] * other[2]
    }
}

impl Mul<f64> for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn mul(self, scalar: f64) -> Vector3D {
        Vector3D([self[0] * scalar, self[1] * scalar, self[2] * scalar])
    }
}

impl Mul<Vector3D> for f64 {
    type Output = Vector3D;
    #[inline]
    fn mul(self, vector: Vector3D) -> Vector3D {
        vector * self
    }
}

impl MulAssign<f64> for Vector3D {
    #[inline]
    fn mul_assign(&mut self, scalar: f64) {
        self.0[0] *= scalar;
        self.0[1] *= scalar;
        self.0[2] *= scalar;
    }
}

impl Div<f64> for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn div(self, scalar: f64) -> Vector3D {
        Vector3D([self[0] / scalar, self[1] / scalar, self[2] / scalar])
    }
}

/// Cross product between two vectors
impl BitXor<Vector3D> for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn bitxor(self, other: Vector3D) -> Vector3D {
        Vector3D([
            self[1] * other[2] - self[2] * other[1],
            self[2] * other[0] - self[0] * other[2],
            self[0] * other[1] - self[1] * other[0],
        ])
    }
}
