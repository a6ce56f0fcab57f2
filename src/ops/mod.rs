//! # Tensor Operation Kernels
//!
//! This module holds the numeric kernels behind the differentiable operations
//! exposed in [`crate::backprop`].
//!
//! ## Submodules
//!
//! - [`cpu`] — Multi-threaded CPU kernels (the crate's only backend)
//!
//! ## Notes
//!
//! - Kernels return both forward values and backward closures
//! - Backward closures capture cloned input data, so they stay valid after
//!   the inputs they were derived from are dropped
//! - Parallelism is internal to each kernel (`rayon`); callers see a
//!   synchronous interface

pub mod cpu;

use crate::sparse::Tensor;

/// Backward closure of a binary sparse op: maps the upstream gradient to
/// `(weight gradients, input gradients)`, one scalar per stored entry.
pub type SparseBack = dyn Fn(&[f64]) -> (Vec<f64>, Vec<f64>);

/// Backward closure of an elementwise op over sparse values.
pub type ValueBack = dyn Fn(&[f64]) -> Vec<f64>;

/// Backward closure of a scalar loss: maps `dL/dloss` to a gradient tensor.
pub type LossBack = dyn Fn(f64) -> Tensor<f64>;
