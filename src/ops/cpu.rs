//! Parallel CPU kernels for the sparse fully-connected operation.
//!
//! # CPU Backend
//!
//! This module provides the numeric implementations of the crate's
//! differentiable operations. The public closure-style API in
//! [`crate::backprop`] delegates here.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - O(1) coordinate lookup through hashed index maps instead of a linear
//!   scan over the input triple
//!
//! ## Implemented Ops
//!
//! - `sparse_dense`: sparse fully-connected forward pass with gradient closure
//! - `relu`: ReLU over sparse value vectors with forward and backward pass
//! - `softmax_cross_entropy`: mean softmax cross-entropy over dense logits
//! - `sgd`: in-place stochastic gradient descent step
//!
//! ## Semantics
//!
//! The sparse kernels treat a coordinate that is absent from a triple as an
//! exact zero. A batch row whose nonzero columns disagree with the weight
//! pattern therefore contributes zeros silently rather than failing; callers
//! that want the mismatch surfaced validate before invoking the kernel (see
//! [`crate::layer`]).

use rayon::prelude::*;

use crate::ops::{LossBack, SparseBack, ValueBack};
use crate::sparse::{SparseTensor, Tensor, WithGrad, cross_pattern};

/// Computes the sparse fully-connected product of a weight triple and an
/// input triple, returning the result and a closure for backpropagation.
///
/// # Requirements
/// - `w.shape = [n_units_out, n_units_in]`, indices are `[out_unit, in_col]`
/// - `x.shape = [batch, n_units_in]`, indices are `[batch_row, in_col]`
///
/// # Semantics
/// For every batch row `b` and weight entry `(unit, col, w)`, accumulates
/// `w * x[b, col]` into `out[b, unit]`. An input coordinate absent from `x`
/// contributes zero. The output triple is dense over the pattern: every
/// `(row, unit)` pair is present, row-major, even when its value is zero.
///
/// # Returns
/// - Output triple of shape `[batch, n_units_out]` with
///   `batch * n_units_out` entries
/// - Backward function mapping the upstream gradient (dense, row-major,
///   `grad[row * n_units_out + unit]`) to `(w_grad, x_grad)`, one scalar per
///   stored weight/input entry
///
/// # Panics
/// Panics if the inner dimensions of `w` and `x` disagree.
///
/// # Example
/// ```rust
/// use sparsegrad::sparse::SparseTensor;
/// use sparsegrad::ops::cpu::sparse_dense;
///
/// let w = SparseTensor::new(vec![[0, 0], [0, 1]], vec![2.0, 3.0], [1, 2]);
/// let x = SparseTensor::new(vec![[0, 0], [0, 1]], vec![5.0, 7.0], [1, 2]);
/// let (h, back) = sparse_dense(&w, &x);
/// assert_eq!(h.values, vec![31.0]);
/// let (w_grad, x_grad) = back(&[1.0]);
/// assert_eq!(w_grad, vec![5.0, 7.0]);
/// assert_eq!(x_grad, vec![2.0, 3.0]);
/// ```
pub fn sparse_dense(w: &SparseTensor, x: &SparseTensor) -> (SparseTensor, Box<SparseBack>) {
    let [n_units_out, n_units_in] = w.shape;
    let [batch, x_cols] = x.shape;
    assert_eq!(n_units_in, x_cols, "sparse_dense shape mismatch");

    let x_map = x.index_map();
    let w_entries: Vec<([usize; 2], f64)> = w
        .indices
        .iter()
        .copied()
        .zip(w.values.iter().copied())
        .collect();

    let mut out_values = vec![0.0; batch * n_units_out];
    out_values
        .par_chunks_mut(n_units_out)
        .enumerate()
        .for_each(|(b, row)| {
            for &([unit, col], wv) in &w_entries {
                if let Some(&xv) = x_map.get(&(b, col)) {
                    row[unit] += wv * xv;
                }
            }
        });

    let out = SparseTensor::new(
        cross_pattern(batch, &(0..n_units_out).collect::<Vec<_>>()),
        out_values,
        [batch, n_units_out],
    );

    let w_back = w.clone();
    let x_back = x.clone();
    let back = Box::new(move |grad: &[f64]| sparse_dense_grad(&w_back, &x_back, grad));

    (out, back)
}

/// Computes the gradients of [`sparse_dense`] with respect to the stored
/// weight and input entries, given the upstream gradient.
///
/// # Semantics
/// - `w_grad[j] = Σ_b grad[b, unit_j] * x[b, col_j]`, where an input
///   coordinate absent from `x` contributes zero
/// - `x_grad[k] = Σ_unit grad[row_k, unit] * w[unit, col_k]`, where a weight
///   coordinate absent from `w` contributes zero (with a cross-product weight
///   pattern every such coordinate exists)
///
/// No gradient flows to indices or shapes.
///
/// # Panics
/// Panics if `grad.len()` differs from `batch * n_units_out`.
pub fn sparse_dense_grad(w: &SparseTensor, x: &SparseTensor, grad: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let [n_units_out, _] = w.shape;
    let [batch, _] = x.shape;
    assert_eq!(
        grad.len(),
        batch * n_units_out,
        "upstream gradient length mismatch"
    );

    let x_map = x.index_map();
    let w_map = w.index_map();

    let w_grad: Vec<f64> = w
        .indices
        .par_iter()
        .map(|&[unit, col]| {
            (0..batch)
                .map(|b| match x_map.get(&(b, col)) {
                    Some(&xv) => grad[b * n_units_out + unit] * xv,
                    None => 0.0,
                })
                .sum()
        })
        .collect();

    let x_grad: Vec<f64> = x
        .indices
        .par_iter()
        .map(|&[row, col]| {
            (0..n_units_out)
                .map(|unit| match w_map.get(&(unit, col)) {
                    Some(&wv) => grad[row * n_units_out + unit] * wv,
                    None => 0.0,
                })
                .sum()
        })
        .collect();

    (w_grad, x_grad)
}

/// Applies the ReLU activation elementwise over a sparse value vector.
///
/// Indices and shape are structural and untouched by activations; only the
/// value vector flows through.
///
/// # Returns
/// - Output values with negatives zeroed
/// - Backward function which passes upstream gradients only where the
///   corresponding input value was positive
pub fn relu(values: &[f64]) -> (Vec<f64>, Box<ValueBack>) {
    let out: Vec<f64> = values
        .par_iter()
        .map(|&v| if v > 0.0 { v } else { 0.0 })
        .collect();

    let input = values.to_vec();
    let back = Box::new(move |grad: &[f64]| {
        input
            .par_iter()
            .zip(grad)
            .map(|(&v, &g)| if v > 0.0 { g } else { 0.0 })
            .collect()
    });

    (out, back)
}

/// Computes the mean softmax cross-entropy between logits and one-hot targets,
/// returning both the scalar loss and a gradient function.
///
/// # Formula
/// $$ L = -\\frac{1}{B} \\sum_b \\sum_c t_{bc} \\log p_{bc} $$
/// where `p` is the row-wise softmax of the logits, stabilized by max
/// subtraction.
///
/// # Returns
/// - Scalar loss `f64`
/// - Backward function mapping upstream scalar gradient `dL` to a tensor of
///   the logits' shape: `(p - t) * dL / B`
///
/// # Panics
/// Panics if `logits` and `targets` are not both `[batch, classes]` tensors of
/// the same shape.
pub fn softmax_cross_entropy(logits: &Tensor<f64>, targets: &Tensor<f64>) -> (f64, Box<LossBack>) {
    assert_eq!(logits.shape, targets.shape, "loss shape mismatch");
    assert_eq!(logits.shape.len(), 2, "expected [batch, classes] logits");
    let batch = logits.shape[0];
    let classes = logits.shape[1];

    let probs: Vec<f64> = logits
        .data
        .par_chunks(classes)
        .flat_map_iter(|row| {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = row.iter().map(|&z| (z - max).exp()).collect();
            let sum: f64 = exps.iter().sum();
            exps.into_iter().map(move |e| e / sum)
        })
        .collect();

    let loss = -probs
        .iter()
        .zip(&targets.data)
        .map(|(&p, &t)| t * p.max(1e-12).ln())
        .sum::<f64>()
        / batch as f64;

    let shape = logits.shape.clone();
    let target_data = targets.data.clone();

    let back = Box::new(move |grad_output: f64| {
        let grad: Vec<f64> = probs
            .par_iter()
            .zip(&target_data)
            .map(|(&p, &t)| (p - t) * grad_output / batch as f64)
            .collect();
        Tensor::new(shape.clone(), grad)
    });

    (loss, back)
}

/// Fraction of rows whose arg-max logit matches the arg-max target.
///
/// # Panics
/// Panics if the shapes differ or are not `[batch, classes]`.
pub fn accuracy(logits: &Tensor<f64>, targets: &Tensor<f64>) -> f64 {
    assert_eq!(logits.shape, targets.shape, "accuracy shape mismatch");
    let batch = logits.shape[0];
    let classes = logits.shape[1];

    let argmax = |row: &[f64]| {
        row.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    };

    let correct = logits
        .data
        .chunks(classes)
        .zip(targets.data.chunks(classes))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count();

    correct as f64 / batch as f64
}

/// Performs one step of stochastic gradient descent on the given parameter
/// tensor.
///
/// # Behavior
/// - Updates `w.value` in-place: `w := w - lr * dL/dw`
/// - Zeros out `w.grad` after the update
pub fn sgd(w: &mut WithGrad<Tensor<f64>>, lr: f64) {
    for (param, grad) in w.value.data.iter_mut().zip(&w.grad.data) {
        *param -= lr * *grad;
    }
    for grad in &mut w.grad.data {
        *grad = 0.0;
    }
}
