//! Differentiable operations and autograd utilities.
//!
//! # Backpropagation Primitives
//!
//! Provides the crate's differentiable operations with built-in gradient
//! support, in two equivalent shapes:
//!
//! - **Closure style:** each free function runs the forward pass and returns
//!   the output together with a backward closure. The closure captures cloned
//!   input data and can be invoked any number of times.
//! - **Capability style:** the [`DifferentiableOp`] trait packages forward and
//!   backward as methods on a value that owns its operands. There is no
//!   process-wide gradient registry; an operation's backward rule travels with
//!   the operation itself and dies with it.
//!
//! ## Autograd Pattern
//!
//! 1. **Inputs** are sparse triples (or dense tensors for losses).
//! 2. **Forward Pass** computes an output value.
//! 3. **Backward Pass** returns a closure capturing minimal cloned data to
//!    compute gradients.
//! 4. **Gradient Application** accumulates these results into `WithGrad`
//!    wrappers and applies [`sgd`].
//!
//! ## Usage Guidelines
//!
//! - Operations **panic** on shape mismatches; ensure consistent dimensions.
//! - No gradient flows to indices or shapes; they are structural.
//! - The sparse kernels treat absent coordinates as exact zeros. Pattern
//!   validation, where wanted, happens in [`crate::layer`].

use crate::ops::{LossBack, SparseBack, ValueBack};
use crate::sparse::{SparseTensor, Tensor, WithGrad};

/// An operation that can run forward and push gradients backward.
///
/// Each implementor owns its operands, so the backward rule needs no global
/// registration: constructing the op is what binds forward to backward.
pub trait DifferentiableOp {
    /// Forward output of the operation.
    type Output;
    /// Upstream gradient the backward pass consumes.
    type Upstream: ?Sized;
    /// Gradients with respect to the operation's differentiable operands.
    type Gradients;

    /// Runs the forward computation.
    fn forward(&self) -> Self::Output;

    /// Maps an upstream gradient to operand gradients.
    fn backward(&self, upstream: &Self::Upstream) -> Self::Gradients;
}

/// The sparse fully-connected operation over a weight triple and an input
/// triple (see `ops::cpu::sparse_dense` for the kernel contract).
#[derive(Debug, Clone)]
pub struct SparseDense {
    pub weights: SparseTensor,
    pub input: SparseTensor,
}

impl SparseDense {
    /// Binds a weight triple and an input triple into one differentiable op.
    pub fn new(weights: SparseTensor, input: SparseTensor) -> Self {
        Self { weights, input }
    }
}

impl DifferentiableOp for SparseDense {
    type Output = SparseTensor;
    type Upstream = [f64];
    type Gradients = (Vec<f64>, Vec<f64>);

    fn forward(&self) -> SparseTensor {
        crate::ops::cpu::sparse_dense(&self.weights, &self.input).0
    }

    fn backward(&self, upstream: &[f64]) -> (Vec<f64>, Vec<f64>) {
        crate::ops::cpu::sparse_dense_grad(&self.weights, &self.input, upstream)
    }
}

/// Computes the sparse fully-connected product of weight and input triples.
///
/// # Returns
/// - `out`: output triple of shape `[batch, n_units_out]`, dense over the
///   row-major `(row, unit)` pattern
/// - `back`: closure mapping the upstream dense gradient to
///   `(w_grad, x_grad)`, one scalar per stored weight/input entry
///
/// # Panics
/// Panics if the inner dimensions of `w` and `x` do not match.
///
/// # Example
/// ```rust
/// use sparsegrad::backprop::sparse_dense;
/// use sparsegrad::sparse::SparseTensor;
///
/// let w = SparseTensor::new(vec![[0, 0], [1, 0]], vec![1.0, -1.0], [2, 1]);
/// let x = SparseTensor::new(vec![[0, 0]], vec![3.0], [1, 1]);
/// let (h, back) = sparse_dense(&w, &x);
/// assert_eq!(h.values, vec![3.0, -3.0]);
/// let (w_grad, x_grad) = back(&[1.0, 1.0]);
/// assert_eq!(w_grad, vec![3.0, 3.0]);
/// assert_eq!(x_grad, vec![0.0]);
/// ```
pub fn sparse_dense(w: &SparseTensor, x: &SparseTensor) -> (SparseTensor, Box<SparseBack>) {
    crate::ops::cpu::sparse_dense(w, x)
}

/// Applies the ReLU activation (`max(0, x)`) elementwise over a sparse value
/// vector.
///
/// # Returns
/// - `out`: values with negatives zeroed
/// - `back`: closure passing upstream gradients only where the input was
///   positive
pub fn relu(values: &[f64]) -> (Vec<f64>, Box<ValueBack>) {
    crate::ops::cpu::relu(values)
}

/// Computes mean softmax cross-entropy between dense logits and one-hot
/// targets.
///
/// # Returns
/// - Scalar loss value
/// - Closure that maps `dL/dloss` into a gradient tensor of the logits' shape
///
/// # Panics
/// Panics if shapes of `logits` and `targets` differ.
pub fn softmax_cross_entropy(logits: &Tensor<f64>, targets: &Tensor<f64>) -> (f64, Box<LossBack>) {
    crate::ops::cpu::softmax_cross_entropy(logits, targets)
}

/// Fraction of batch rows classified correctly (arg-max agreement).
pub fn accuracy(logits: &Tensor<f64>, targets: &Tensor<f64>) -> f64 {
    crate::ops::cpu::accuracy(logits, targets)
}

/// Performs an in-place Stochastic Gradient Descent (SGD) update.
///
/// Applies `param = param - lr * gradient` and then zeros the gradient.
pub fn sgd(w: &mut WithGrad<Tensor<f64>>, lr: f64) {
    crate::ops::cpu::sgd(w, lr)
}
