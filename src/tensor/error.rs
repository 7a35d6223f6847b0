use thiserror::Error;

/// Shape and arity failures raised by tensor operations.
///
/// Every variant is raised before the receiving tensor is touched, so a
/// failed call leaves its operands exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    /// Argument count to a constructor, reshape or indexed access differs from the rank.
    #[error("number of dimensions do not match with {expected} (got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Bulk assignment source length differs from the tensor's element count.
    #[error("data size {actual} does not match tensor size {expected}")]
    DataSizeMismatch { expected: usize, actual: usize },

    /// Two shapes that cannot be unified by broadcasting.
    #[error("shapes {left:?} and {right:?} do not match and are not compatible for broadcasting")]
    BroadcastIncompatible { left: Vec<usize>, right: Vec<usize> },

    /// Transpose/matrix product on an unsuitable shape.
    #[error("incompatible shape: {0}")]
    IncompatibleShape(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
