//! Core sparse and dense tensor data structures.
//!
//! # Sparse Tensor Utilities
//!
//! This module defines the data carriers the rest of the crate computes with:
//!
//! - [`SparseTensor`] — a 2-D tensor represented by its nonzero coordinates,
//!   positionally aligned values, and dense shape (COO-style triple)
//! - [`Tensor`] — a dense N-dimensional tensor with row-major data, used for
//!   logits, labels, and trainable value vectors
//! - [`WithGrad`] — pairs a value with its gradient for autograd
//!
//! ## Design Highlights
//! - Sparse indices are `[row, col]` pairs; the crate's layers only ever deal
//!   in matrices, so the coordinate rank is fixed at two
//! - Values and indices are positionally aligned: `values[i]` lives at
//!   `indices[i]`
//! - Constructors enforce the alignment and bounds invariants at runtime
//! - `to_dense` scatter-adds into a zero tensor, so duplicate coordinates
//!   accumulate rather than overwrite
//!
//! ## Limitations
//! - Rank-2 sparse tensors only
//! - No broadcasting, slicing, or shape inference
//!
//! ## Example
//!
//! ```rust
//! use sparsegrad::sparse::SparseTensor;
//! let t = SparseTensor::new(vec![[0, 0], [0, 2]], vec![1.5, -2.0], [1, 3]);
//! assert_eq!(t.to_dense().data, vec![1.5, 0.0, -2.0]);
//! ```

use std::collections::HashMap;

/// Represents an N-dimensional dense tensor with a shape and flat row-major data.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }
}

impl Tensor<f64> {
    /// Creates a zero-filled tensor of the given shape.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }
}

/// A container for tracking gradients of values (used in autograd).
///
/// Typically used as `WithGrad<Tensor<f64>>` for trainable parameters.
#[derive(Debug, Clone)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

impl WithGrad<Tensor<f64>> {
    /// Wraps a tensor with a zeroed gradient of the same shape.
    pub fn new(value: Tensor<f64>) -> Self {
        let grad = Tensor::zeros(value.shape.clone());
        Self { value, grad }
    }
}

/// A 2-D sparse tensor: nonzero coordinates, positionally aligned values, and
/// the dense shape they live in.
///
/// Indices are `[row, col]` pairs. The triple makes no uniqueness claim about
/// coordinates; operations that scatter will accumulate duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTensor {
    pub indices: Vec<[usize; 2]>,
    pub values: Vec<f64>,
    pub shape: [usize; 2],
}

impl SparseTensor {
    /// Creates a sparse tensor from an index/value/shape triple.
    ///
    /// # Panics
    /// Panics if `indices` and `values` differ in length, or if any index
    /// falls outside `shape`.
    pub fn new(indices: Vec<[usize; 2]>, values: Vec<f64>, shape: [usize; 2]) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "{} indices misaligned with {} values",
            indices.len(),
            values.len()
        );
        for &[r, c] in &indices {
            assert!(
                r < shape[0] && c < shape[1],
                "index [{r}, {c}] out of bounds for shape {shape:?}"
            );
        }
        Self {
            indices,
            values,
            shape,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Builds a `(row, col) -> value` map for O(1) coordinate lookup.
    ///
    /// Later duplicates win; the crate's fixed patterns never contain any.
    pub fn index_map(&self) -> HashMap<(usize, usize), f64> {
        self.indices
            .iter()
            .zip(&self.values)
            .map(|(&[r, c], &v)| ((r, c), v))
            .collect()
    }

    /// Densifies by scatter-adding every stored value into a zero tensor of
    /// this tensor's shape. Duplicate coordinates accumulate.
    pub fn to_dense(&self) -> Tensor<f64> {
        let [rows, cols] = self.shape;
        let mut out = Tensor::zeros(vec![rows, cols]);
        for (&[r, c], &v) in self.indices.iter().zip(&self.values) {
            out.data[r * cols + c] += v;
        }
        out
    }

    /// Returns the sorted set of column indices stored for `row`.
    pub fn row_cols(&self, row: usize) -> Vec<usize> {
        let mut cols: Vec<usize> = self
            .indices
            .iter()
            .filter(|&&[r, _]| r == row)
            .map(|&[_, c]| c)
            .collect();
        cols.sort_unstable();
        cols
    }
}

/// Derives the weight index pattern for a sparse fully-connected layer: the
/// full cross product of output units × fixed input columns, output-unit major.
///
/// The pattern is a pure function of `(n_units_out, in_cols)`, so rebuilding a
/// layer with the same configuration always yields the same coordinates.
pub fn cross_pattern(n_units_out: usize, in_cols: &[usize]) -> Vec<[usize; 2]> {
    let mut indices = Vec::with_capacity(n_units_out * in_cols.len());
    for unit in 0..n_units_out {
        for &col in in_cols {
            indices.push([unit, col]);
        }
    }
    indices
}
