//! sparsegrad: sparse fully-connected layers with hand-derived gradients.
//!
//! A small framework for training neural networks whose layers operate
//! directly on sparse index/value/shape triples, with manually derived
//! backpropagation rules instead of a generic autodiff engine.
//!
//! # Features
//!
//! - Sparse fully-connected forward/backward ops over COO-style triples.
//! - A capability-style [`backprop::DifferentiableOp`] interface binding each
//!   forward computation to its backward rule, with no global registry.
//! - Two-phase layers: configuration and built state are separate types.
//! - Named, independently restorable checkpoints of every layer's weights.
//!
//! # Restrictions
//!
//! This is not a general sparse linear-algebra library. Every layer assumes a
//! fixed nonzero column pattern shared by its weight tensor and every input
//! sample; layers validate that pattern by default and can be configured to
//! fall back to treating missing coordinates as zeros.
//!
//! # Modules
//!
//! - [`sparse`] — Sparse and dense tensor data structures.
//! - [`ops`] — CPU kernels behind the differentiable operations.
//! - [`backprop`] — Differentiable operations and autograd utilities.
//! - [`layer`] — Sparse fully-connected layers and their lifecycle.
//! - [`model`] — The fixed three-layer classifier, tape, and optimizer step.
//! - [`data`] — Synthetic XOR-style dataset and batching.
//! - [`modelio`] — Saving/loading of named model weights.
//!
//! # Example
//!
//! ```rust
//! use sparsegrad::backprop::sparse_dense;
//! use sparsegrad::sparse::SparseTensor;
//!
//! let w = SparseTensor::new(vec![[0, 0], [0, 1]], vec![2.0, 3.0], [1, 2]);
//! let x = SparseTensor::new(vec![[0, 0], [0, 1]], vec![5.0, 7.0], [1, 2]);
//! let (h, _back) = sparse_dense(&w, &x);
//! assert_eq!(h.values, vec![31.0]);
//! ```

pub mod backprop;
pub mod data;
pub mod layer;
pub mod model;
pub mod modelio;
pub mod ops;
pub mod sparse;
