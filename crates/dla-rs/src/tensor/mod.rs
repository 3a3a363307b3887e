//! Tensor metadata: element types, shapes, and byte-size accounting.

mod dtype;

pub use dtype::DType;

use serde::{Deserialize, Serialize};

/// Ordered, positive dimension extents of a tensor value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Builds a shape from its dimension extents in axis order.
    ///
    /// Every graph value carries at least one axis; a rank-zero shape is a
    /// programmer error and panics.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "tensor shapes carry at least one axis");
        Self { dims }
    }

    /// Dimension extents in axis order.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Element count, or `None` when the product overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// Total storage in bytes under a dense layout, or `None` when the byte
    /// count overflows the address space.
    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .element_count()?
            .checked_mul(self.dtype.size_in_bytes())
    }
}
