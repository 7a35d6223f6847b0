//! Dense fixed-rank tensors.
//!
//! `Tensor<T, RANK>` stores its extents in a `[usize; RANK]` and its elements
//! in one contiguous row-major buffer (last axis fastest). The rank is a
//! compile-time constant; only the extents can change at runtime.

use std::fmt;
use std::ops::{Index, IndexMut};

use num_traits::Zero;

pub mod error;
pub mod linalg;
pub mod ops;

pub use error::{Result, TensorError};
pub use linalg::{matrix_product, transpose_2d};

/// Multi-dimensional array with a fixed number of axes.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T, const RANK: usize> {
    shape: [usize; RANK],
    data: Vec<T>,
}

pub(crate) fn volume(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Linear offset of `idx` inside a row-major buffer of the given shape.
pub(crate) fn ravel<const RANK: usize>(idx: &[usize; RANK], shape: &[usize; RANK]) -> usize {
    let mut offset = 0;
    let mut stride = 1;
    for axis in (0..RANK).rev() {
        debug_assert!(
            idx[axis] < shape[axis],
            "index {} out of bounds for axis {} with extent {}",
            idx[axis],
            axis,
            shape[axis]
        );
        offset += idx[axis] * stride;
        stride *= shape[axis];
    }
    offset
}

/// Inverse of [`ravel`]: multi-index of a linear offset.
pub(crate) fn unravel<const RANK: usize>(mut linear: usize, shape: &[usize; RANK]) -> [usize; RANK] {
    let mut idx = [0; RANK];
    for axis in (0..RANK).rev() {
        idx[axis] = linear % shape[axis];
        linear /= shape[axis];
    }
    idx
}

fn dims_to_shape<const RANK: usize>(dims: &[usize]) -> Result<[usize; RANK]> {
    if dims.len() != RANK {
        return Err(TensorError::DimensionMismatch {
            expected: RANK,
            actual: dims.len(),
        });
    }
    let mut shape = [0; RANK];
    shape.copy_from_slice(dims);
    Ok(shape)
}

impl<T: Clone + Zero, const RANK: usize> Tensor<T, RANK> {
    /// Zero-initialized tensor with the given extents.
    pub fn new(shape: [usize; RANK]) -> Self {
        Self {
            shape,
            data: vec![T::zero(); volume(&shape)],
        }
    }

    /// Like [`Tensor::new`] but with the extents given as a runtime slice.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        Ok(Self::new(dims_to_shape::<RANK>(dims)?))
    }

    /// Tensor with every element set to `value`.
    pub fn filled(shape: [usize; RANK], value: T) -> Self {
        Self {
            shape,
            data: vec![value; volume(&shape)],
        }
    }

    /// Changes the extents, resizing the buffer to the new element count.
    ///
    /// Elements are kept in buffer order; growth is zero-filled.
    pub fn reshape(&mut self, dims: &[usize]) -> Result<()> {
        let shape = dims_to_shape::<RANK>(dims)?;
        self.shape = shape;
        self.data.resize(volume(&shape), T::zero());
        Ok(())
    }
}

impl<T, const RANK: usize> Tensor<T, RANK> {
    /// Wraps an existing buffer.
    pub fn from_vec(shape: [usize; RANK], data: Vec<T>) -> Result<Self> {
        let expected = volume(&shape);
        if data.len() != expected {
            return Err(TensorError::DataSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Row-major strides of the current shape.
    pub fn strides(&self) -> [usize; RANK] {
        let mut strides = [1; RANK];
        for axis in (0..RANK.saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        strides
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Element at a runtime multi-index.
    ///
    /// Fails when `idx.len() != RANK`. Index values are not range checked in
    /// release builds.
    pub fn get(&self, idx: &[usize]) -> Result<&T> {
        let idx = dims_to_shape::<RANK>(idx)?;
        Ok(&self.data[ravel(&idx, &self.shape)])
    }

    pub fn get_mut(&mut self, idx: &[usize]) -> Result<&mut T> {
        let idx = dims_to_shape::<RANK>(idx)?;
        let offset = ravel(&idx, &self.shape);
        Ok(&mut self.data[offset])
    }
}

impl<T: Clone, const RANK: usize> Tensor<T, RANK> {
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Overwrites every element from `values`, in row-major order.
    pub fn assign(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.data.len() {
            return Err(TensorError::DataSizeMismatch {
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        self.data.clone_from_slice(values);
        Ok(())
    }

    /// Copies `len` consecutive entries of the first axis starting at `start`.
    pub fn slice_rows(&self, start: usize, len: usize) -> Result<Self> {
        if RANK == 0 {
            return Err(TensorError::IncompatibleShape(
                "cannot slice rows of a rank-0 tensor".to_string(),
            ));
        }
        let end = match start.checked_add(len).filter(|&end| end <= self.shape[0]) {
            Some(end) => end,
            None => {
                return Err(TensorError::IncompatibleShape(format!(
                    "{} rows from {} out of range for first axis of extent {}",
                    len, start, self.shape[0]
                )))
            }
        };
        let row = volume(&self.shape[1..]);
        let mut shape = self.shape;
        shape[0] = len;
        Ok(Self {
            shape,
            data: self.data[start * row..end * row].to_vec(),
        })
    }
}

impl<T: Clone + Zero, const RANK: usize> Default for Tensor<T, RANK> {
    /// A 1×…×1 tensor holding a single zero.
    fn default() -> Self {
        Self::new([1; RANK])
    }
}

impl<T, const RANK: usize> Index<[usize; RANK]> for Tensor<T, RANK> {
    type Output = T;

    fn index(&self, idx: [usize; RANK]) -> &T {
        &self.data[ravel(&idx, &self.shape)]
    }
}

impl<T, const RANK: usize> IndexMut<[usize; RANK]> for Tensor<T, RANK> {
    fn index_mut(&mut self, idx: [usize; RANK]) -> &mut T {
        let offset = ravel(&idx, &self.shape);
        &mut self.data[offset]
    }
}

impl<'a, T, const RANK: usize> IntoIterator for &'a Tensor<T, RANK> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<T: fmt::Display, const RANK: usize> Tensor<T, RANK> {
    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, level: usize, offset: usize) -> fmt::Result {
        let indent = " ".repeat(level * 4);
        let extent = self.shape[level];
        if level + 1 == RANK {
            write!(f, "{}", indent)?;
            for i in 0..extent {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.data[offset + i])?;
            }
            return Ok(());
        }
        writeln!(f, "{}{{", indent)?;
        let block = volume(&self.shape[level + 1..]);
        for i in 0..extent {
            self.fmt_level(f, level + 1, offset + i * block)?;
            if i + 1 < extent {
                writeln!(f)?;
            }
        }
        write!(f, "\n{}}}", indent)
    }
}

impl<T: fmt::Display, const RANK: usize> fmt::Display for Tensor<T, RANK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if RANK == 0 {
            return match self.data.first() {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            };
        }
        self.fmt_level(f, 0, 0)
    }
}
