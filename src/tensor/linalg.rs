//! Matrix operations over the last two axes.
//!
//! Every axis before the last two is a batch axis: transpose keeps it as is,
//! matrix product requires it to match exactly between operands.

use num_traits::{Num, Zero};
use tracing::instrument;

use super::{volume, Result, Tensor, TensorError};

/// Swaps the last two axes of `t`.
pub fn transpose_2d<T: Copy + Zero, const RANK: usize>(t: &Tensor<T, RANK>) -> Result<Tensor<T, RANK>> {
    if RANK < 2 {
        return Err(TensorError::IncompatibleShape(format!(
            "cannot transpose a rank-{} tensor: need at least 2 dimensions",
            RANK
        )));
    }
    let rows = t.shape[RANK - 2];
    let cols = t.shape[RANK - 1];
    let block = rows * cols;

    let mut shape = t.shape;
    shape.swap(RANK - 2, RANK - 1);
    let mut data = vec![T::zero(); t.data.len()];

    for (i, out) in data.iter_mut().enumerate() {
        let base = (i / block) * block;
        let p = i % block;
        // out is [cols x rows]: p = new_row * rows + new_col
        let new_row = p / rows;
        let new_col = p % rows;
        *out = t.data[base + new_col * cols + new_row];
    }
    Ok(Tensor { shape, data })
}

/// Batched matrix product over the last two axes.
///
/// `a` is `[..batch, M, K]`, `b` is `[..batch, K, N]`, the result is
/// `[..batch, M, N]`.
#[instrument(level = "trace", skip(a, b), fields(a = ?a.shape, b = ?b.shape))]
pub fn matrix_product<T: Copy + Num, const RANK: usize>(
    a: &Tensor<T, RANK>,
    b: &Tensor<T, RANK>,
) -> Result<Tensor<T, RANK>> {
    if RANK < 2 {
        return Err(TensorError::IncompatibleShape(format!(
            "matrix product needs at least 2 dimensions, got rank {}",
            RANK
        )));
    }
    let (m, k) = (a.shape[RANK - 2], a.shape[RANK - 1]);
    let (k2, n) = (b.shape[RANK - 2], b.shape[RANK - 1]);
    if k != k2 {
        return Err(TensorError::IncompatibleShape(format!(
            "matrix dimensions are incompatible for multiplication: {:?} x {:?}",
            a.shape, b.shape
        )));
    }
    if a.shape[..RANK - 2] != b.shape[..RANK - 2] {
        return Err(TensorError::IncompatibleShape(format!(
            "batch dimensions do not match: {:?} x {:?}",
            a.shape, b.shape
        )));
    }

    let mut shape = a.shape;
    shape[RANK - 1] = n;
    let batches = volume(&a.shape[..RANK - 2]);
    let mut data = vec![T::zero(); batches * m * n];

    for batch in 0..batches {
        let lhs = &a.data[batch * m * k..(batch + 1) * m * k];
        let rhs = &b.data[batch * k * n..(batch + 1) * k * n];
        let out = &mut data[batch * m * n..(batch + 1) * m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = T::zero();
                for p in 0..k {
                    sum = sum + lhs[i * k + p] * rhs[p * n + j];
                }
                out[i * n + j] = sum;
            }
        }
    }
    Ok(Tensor { shape, data })
}

impl<T: Copy + Num, const RANK: usize> Tensor<T, RANK> {
    pub fn transpose_2d(&self) -> Result<Self> {
        transpose_2d(self)
    }

    pub fn matmul(&self, other: &Self) -> Result<Self> {
        matrix_product(self, other)
    }
}

impl<T: Copy + Num> Tensor<T, 2> {
    /// Column sums as a `[1, N]` row.
    pub fn sum_axis0(&self) -> Self {
        let [rows, cols] = self.shape;
        let mut data = vec![T::zero(); cols];
        for r in 0..rows {
            for (c, acc) in data.iter_mut().enumerate() {
                *acc = *acc + self.data[r * cols + c];
            }
        }
        Tensor {
            shape: [1, cols],
            data,
        }
    }

    /// `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut eye = Self::new([n, n]);
        for i in 0..n {
            eye.data[i * n + i] = T::one();
        }
        eye
    }
}
