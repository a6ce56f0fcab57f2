//! Sparse fully-connected layers with an explicit unbuilt/built split.
//!
//! # Layer Lifecycle
//!
//! A layer exists in exactly one of two states, and the states are distinct
//! types:
//!
//! - [`SparseFullyConnected`] — configuration only. Records unit counts, the
//!   fixed nonzero column pattern, the activation, and output/validation
//!   flags. Nothing is allocated yet.
//! - [`SparseLayer`] — built. Owns the Glorot-uniform initialized trainable
//!   value vector and the immutable weight index pattern derived from
//!   `(n_units_out, in_cols)`. Created once by [`SparseFullyConnected::build`],
//!   which consumes the configuration, so a layer cannot be rebuilt or its
//!   pattern reallocated by construction.
//!
//! ## Pattern validation
//!
//! The sparse kernels treat coordinates absent from the input triple as exact
//! zeros. A built layer validates each batch row's nonzero columns against its
//! expected pattern before invoking the kernel and fails with
//! [`SparseError::PatternMismatch`] on disagreement. Construct the
//! configuration with [`SparseFullyConnected::lenient_pattern`] to skip the
//! check and keep the silent-zero behavior instead.

use rand::Rng;
use std::error::Error;
use std::fmt;

use crate::backprop;
use crate::ops::SparseBack;
use crate::sparse::{SparseTensor, Tensor, WithGrad, cross_pattern};

/// Errors raised by layer and model operations.
#[derive(Debug)]
pub enum SparseError {
    /// A batch row's nonzero columns disagree with the layer's fixed pattern.
    PatternMismatch {
        layer: String,
        row: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// A restored tensor's shape disagrees with the layer it targets.
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// A checkpoint's content could not be read back into the model.
    Checkpoint(String),
    /// The checkpoint file itself could not be read or written.
    Io(std::io::Error),
}

impl fmt::Display for SparseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatternMismatch {
                layer,
                row,
                expected,
                got,
            } => write!(
                f,
                "layer {layer}: batch row {row} has nonzero columns {got:?}, expected {expected:?}"
            ),
            Self::ShapeMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "tensor {name} has shape {got:?}, expected {expected:?}"
            ),
            Self::Checkpoint(msg) => write!(f, "checkpoint error: {msg}"),
            Self::Io(err) => write!(f, "checkpoint i/o error: {err}"),
        }
    }
}

impl Error for SparseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SparseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Elementwise activation applied to a layer's output values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// Identity; values pass through unchanged.
    #[default]
    Linear,
    /// `max(0, x)`.
    Relu,
}

/// A built layer's forward output: sparse by default, dense when the layer was
/// configured to densify.
#[derive(Debug, Clone)]
pub enum LayerOutput {
    Sparse(SparseTensor),
    Dense(Tensor<f64>),
}

impl LayerOutput {
    /// The output as a dense tensor, scatter-adding if still sparse.
    pub fn into_dense(self) -> Tensor<f64> {
        match self {
            Self::Sparse(s) => s.to_dense(),
            Self::Dense(t) => t,
        }
    }

    /// The output as a sparse triple.
    ///
    /// # Panics
    /// Panics if the layer densified its output.
    pub fn into_sparse(self) -> SparseTensor {
        match self {
            Self::Sparse(s) => s,
            Self::Dense(_) => panic!("layer output was densified"),
        }
    }
}

/// Configuration of a sparse fully-connected layer (the unbuilt state).
#[derive(Debug, Clone)]
pub struct SparseFullyConnected {
    name: String,
    n_units_out: usize,
    n_units_in: usize,
    in_cols: Vec<usize>,
    activation: Activation,
    densify: bool,
    strict_pattern: bool,
}

impl SparseFullyConnected {
    /// Starts a layer configuration.
    ///
    /// `in_cols` is the fixed list of input columns every sample is expected
    /// to populate; the weight pattern will be the full cross product of
    /// output units × `in_cols`.
    ///
    /// # Panics
    /// Panics if `in_cols` is empty, contains duplicates, or references a
    /// column outside `n_units_in`.
    pub fn new(
        name: impl Into<String>,
        n_units_out: usize,
        n_units_in: usize,
        in_cols: Vec<usize>,
    ) -> Self {
        assert!(!in_cols.is_empty(), "layer needs at least one input column");
        let mut seen = in_cols.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(
            seen.len(),
            in_cols.len(),
            "duplicate input columns would double-count gradients"
        );
        for &c in &in_cols {
            assert!(c < n_units_in, "input column {c} out of range {n_units_in}");
        }
        Self {
            name: name.into(),
            n_units_out,
            n_units_in,
            in_cols,
            activation: Activation::default(),
            densify: false,
            strict_pattern: true,
        }
    }

    /// Sets the elementwise activation (default: linear).
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Makes the built layer scatter-add its sparse output into a dense
    /// tensor.
    pub fn densify(mut self) -> Self {
        self.densify = true;
        self
    }

    /// Disables input pattern validation: coordinates absent from the input
    /// triple silently contribute zero instead of failing.
    pub fn lenient_pattern(mut self) -> Self {
        self.strict_pattern = false;
        self
    }

    /// Builds the layer: allocates the Glorot-uniform trainable value vector
    /// and derives the immutable weight index pattern.
    pub fn build(self, rng: &mut impl Rng) -> SparseLayer {
        let nnz = self.n_units_out * self.in_cols.len();
        let limit = (6.0 / (self.in_cols.len() + self.n_units_out) as f64).sqrt();
        let values: Vec<f64> = (0..nnz).map(|_| rng.random_range(-limit..limit)).collect();

        SparseLayer {
            pattern: cross_pattern(self.n_units_out, &self.in_cols),
            weights: WithGrad::new(Tensor::new(vec![nnz], values)),
            config: self,
        }
    }
}

/// A built sparse fully-connected layer (the built state).
///
/// The index pattern is fixed for the layer's lifetime; only the value vector
/// changes, and only through gradient accumulation and optimizer steps.
#[derive(Debug, Clone)]
pub struct SparseLayer {
    config: SparseFullyConnected,
    pattern: Vec<[usize; 2]>,
    weights: WithGrad<Tensor<f64>>,
}

impl SparseLayer {
    /// The layer's checkpoint name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Number of output units.
    pub fn n_units_out(&self) -> usize {
        self.config.n_units_out
    }

    /// The fixed weight index pattern (`[out_unit, in_col]` pairs).
    pub fn pattern(&self) -> &[[usize; 2]] {
        &self.pattern
    }

    /// The trainable value vector with its gradient.
    pub fn weights(&self) -> &WithGrad<Tensor<f64>> {
        &self.weights
    }

    /// Mutable access for the optimizer and checkpoint restore.
    pub fn weights_mut(&mut self) -> &mut WithGrad<Tensor<f64>> {
        &mut self.weights
    }

    /// The weight triple assembled from the fixed pattern and current values.
    pub fn weight_tensor(&self) -> SparseTensor {
        SparseTensor::new(
            self.pattern.clone(),
            self.weights.value.data.clone(),
            [self.config.n_units_out, self.config.n_units_in],
        )
    }

    /// Checks every batch row's nonzero columns against the expected pattern.
    pub fn check_pattern(&self, x: &SparseTensor) -> Result<(), SparseError> {
        let mut expected = self.config.in_cols.clone();
        expected.sort_unstable();
        for row in 0..x.shape[0] {
            let got = x.row_cols(row);
            if got != expected {
                return Err(SparseError::PatternMismatch {
                    layer: self.config.name.clone(),
                    row,
                    expected: expected.clone(),
                    got,
                });
            }
        }
        Ok(())
    }

    /// Runs the layer forward on a sparse input batch.
    ///
    /// # Returns
    /// - The activated output, densified when the layer was configured so
    /// - A backward closure mapping the upstream gradient (dense, row-major
    ///   over `[batch, n_units_out]`) to `(w_grad, x_grad)`
    ///
    /// # Errors
    /// [`SparseError::PatternMismatch`] when validation is enabled and a batch
    /// row deviates from the expected columns.
    pub fn forward(&self, x: &SparseTensor) -> Result<(LayerOutput, Box<SparseBack>), SparseError> {
        if self.config.strict_pattern {
            self.check_pattern(x)?;
        }

        let (mut h, op_back) = backprop::sparse_dense(&self.weight_tensor(), x);

        let back: Box<SparseBack> = match self.config.activation {
            Activation::Linear => op_back,
            Activation::Relu => {
                let (activated, act_back) = backprop::relu(&h.values);
                h.values = activated;
                Box::new(move |upstream: &[f64]| op_back(&act_back(upstream)))
            }
        };

        // The output pattern is the row-major cross product of rows × units,
        // so a densified output's flattened gradient feeds `back` unchanged.
        let out = if self.config.densify {
            LayerOutput::Dense(h.to_dense())
        } else {
            LayerOutput::Sparse(h)
        };

        Ok((out, back))
    }
}
