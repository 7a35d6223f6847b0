//! Elementwise arithmetic: tensor/tensor with broadcasting, tensor/scalar in
//! both operand orders.

use std::ops::{Add, Div, Mul, Neg, Sub};

use num_traits::Num;

use super::{ravel, unravel, volume, Result, Tensor, TensorError};

/// Result shape of broadcasting `left` against `right`.
///
/// Per axis the extents must be equal or one of them must be 1.
pub fn broadcast_shape<const RANK: usize>(
    left: &[usize; RANK],
    right: &[usize; RANK],
) -> Result<[usize; RANK]> {
    let mut shape = [0; RANK];
    for axis in 0..RANK {
        shape[axis] = match (left[axis], right[axis]) {
            (l, r) if l == r || r == 1 => l,
            (1, r) => r,
            _ => {
                return Err(TensorError::BroadcastIncompatible {
                    left: left.to_vec(),
                    right: right.to_vec(),
                })
            }
        };
    }
    Ok(shape)
}

impl<T: Copy, const RANK: usize> Tensor<T, RANK> {
    /// Combines two tensors elementwise, stretching extent-1 axes.
    pub fn zip_with<F>(&self, other: &Self, op: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        let shape = broadcast_shape(&self.shape, &other.shape)?;

        if self.shape == other.shape {
            let data = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| op(a, b))
                .collect();
            return Ok(Tensor { shape, data });
        }

        let total = volume(&shape);
        let mut data = Vec::with_capacity(total);
        for linear in 0..total {
            let idx = unravel(linear, &shape);
            let mut idx_a = idx;
            let mut idx_b = idx;
            for axis in 0..RANK {
                if self.shape[axis] == 1 {
                    idx_a[axis] = 0;
                }
                if other.shape[axis] == 1 {
                    idx_b[axis] = 0;
                }
            }
            data.push(op(
                self.data[ravel(&idx_a, &self.shape)],
                other.data[ravel(&idx_b, &other.shape)],
            ));
        }
        Ok(Tensor { shape, data })
    }

    /// Applies `f` to every element, keeping the shape.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T,
    {
        Tensor {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn map_inplace<F>(&mut self, f: F)
    where
        F: Fn(T) -> T,
    {
        self.data.iter_mut().for_each(|v| *v = f(*v));
    }
}

impl<T: Copy + Num, const RANK: usize> Tensor<T, RANK> {
    pub fn broadcast_add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn broadcast_sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn broadcast_mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn broadcast_div(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a / b)
    }

    /// Sum of every element.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v)
    }
}

macro_rules! tensor_binary_op {
    ($trait:ident, $method:ident, $named:ident) => {
        impl<'a, T: Copy + Num, const RANK: usize> $trait<&'a Tensor<T, RANK>> for &'a Tensor<T, RANK> {
            type Output = Result<Tensor<T, RANK>>;

            fn $method(self, rhs: &'a Tensor<T, RANK>) -> Self::Output {
                self.$named(rhs)
            }
        }

        impl<T: Copy + Num, const RANK: usize> $trait<T> for &Tensor<T, RANK> {
            type Output = Tensor<T, RANK>;

            fn $method(self, rhs: T) -> Self::Output {
                self.map(|v| v.$method(rhs))
            }
        }

        impl<T: Copy + Num, const RANK: usize> $trait<T> for Tensor<T, RANK> {
            type Output = Tensor<T, RANK>;

            fn $method(mut self, rhs: T) -> Self::Output {
                self.map_inplace(|v| v.$method(rhs));
                self
            }
        }
    };
}

tensor_binary_op!(Add, add, broadcast_add);
tensor_binary_op!(Sub, sub, broadcast_sub);
tensor_binary_op!(Mul, mul, broadcast_mul);
tensor_binary_op!(Div, div, broadcast_div);

// scalar on the left: `s - t` is s minus each element, `s / t` is s over each element
macro_rules! scalar_lhs_ops {
    ($($scalar:ty),*) => {
        $(
            impl<const RANK: usize> Add<&Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn add(self, rhs: &Tensor<$scalar, RANK>) -> Self::Output {
                    rhs.map(|v| self + v)
                }
            }

            impl<const RANK: usize> Sub<&Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn sub(self, rhs: &Tensor<$scalar, RANK>) -> Self::Output {
                    rhs.map(|v| self - v)
                }
            }

            impl<const RANK: usize> Mul<&Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn mul(self, rhs: &Tensor<$scalar, RANK>) -> Self::Output {
                    rhs.map(|v| self * v)
                }
            }

            impl<const RANK: usize> Div<&Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn div(self, rhs: &Tensor<$scalar, RANK>) -> Self::Output {
                    rhs.map(|v| self / v)
                }
            }

            impl<const RANK: usize> Add<Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn add(self, rhs: Tensor<$scalar, RANK>) -> Self::Output {
                    self + &rhs
                }
            }

            impl<const RANK: usize> Sub<Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn sub(self, rhs: Tensor<$scalar, RANK>) -> Self::Output {
                    self - &rhs
                }
            }

            impl<const RANK: usize> Mul<Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn mul(self, rhs: Tensor<$scalar, RANK>) -> Self::Output {
                    self * &rhs
                }
            }

            impl<const RANK: usize> Div<Tensor<$scalar, RANK>> for $scalar {
                type Output = Tensor<$scalar, RANK>;
                fn div(self, rhs: Tensor<$scalar, RANK>) -> Self::Output {
                    self / &rhs
                }
            }
        )*
    };
}

scalar_lhs_ops!(f32, f64, i32, i64, u32, u64, usize);

impl<T: Copy + Neg<Output = T>, const RANK: usize> Neg for &Tensor<T, RANK> {
    type Output = Tensor<T, RANK>;

    fn neg(self) -> Self::Output {
        self.map(|v| -v)
    }
}
