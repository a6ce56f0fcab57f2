//! The fixed three-layer sparse classification network.
//!
//! # Model
//!
//! [`SparseNet`] composes three sparse fully-connected layers:
//!
//! 1. `sparse_fc1` — out=10, in=`n_features`, pattern = the dataset's fixed
//!    feature columns, ReLU
//! 2. `sparse_fc2` — out=10, in=10, identity pattern `0..10`, ReLU
//! 3. `sparse_fc3` — out=2, in=10, identity pattern `0..10`, linear,
//!    densified into classification logits
//!
//! A forward pass yields the logits plus a [`SparseNetTape`] holding the three
//! backward closures; the tape turns an upstream logits gradient into
//! per-layer weight gradients, which [`SparseNet::accumulate`] adds into the
//! layers and [`SparseNet::step`] applies with SGD.

use rand::Rng;

use crate::backprop;
use crate::layer::{Activation, LayerOutput, SparseError, SparseFullyConnected, SparseLayer};
use crate::modelio;
use crate::ops::SparseBack;
use crate::sparse::{SparseTensor, Tensor};

/// Hidden width of the two inner layers.
pub const HIDDEN_UNITS: usize = 10;

/// Number of output classes.
pub const N_CLASSES: usize = 2;

/// A three-layer sparse fully-connected classifier.
pub struct SparseNet {
    layers: [SparseLayer; 3],
}

/// The backward closures captured by one forward pass.
pub struct SparseNetTape {
    backs: [Box<SparseBack>; 3],
}

/// Per-layer weight gradients produced by a tape.
pub struct SparseNetGrads {
    pub w: [Vec<f64>; 3],
}

impl SparseNetTape {
    /// Chains the layer backward closures, turning the dense logits gradient
    /// into one weight gradient vector per layer. Gradients with respect to
    /// the network input are computed along the way and discarded.
    pub fn backward(&self, grad_logits: &Tensor<f64>) -> SparseNetGrads {
        let [back1, back2, back3] = &self.backs;
        let (w3, x3) = back3(&grad_logits.data);
        let (w2, x2) = back2(&x3);
        let (w1, _) = back1(&x2);
        SparseNetGrads { w: [w1, w2, w3] }
    }
}

impl SparseNet {
    /// Builds the network for a `n_features`-wide input space whose samples
    /// populate exactly `feature_cols`.
    pub fn new(n_features: usize, feature_cols: &[usize], rng: &mut impl Rng) -> Self {
        let identity: Vec<usize> = (0..HIDDEN_UNITS).collect();
        let layers = [
            SparseFullyConnected::new("sparse_fc1", HIDDEN_UNITS, n_features, feature_cols.to_vec())
                .activation(Activation::Relu)
                .build(rng),
            SparseFullyConnected::new("sparse_fc2", HIDDEN_UNITS, HIDDEN_UNITS, identity.clone())
                .activation(Activation::Relu)
                .build(rng),
            SparseFullyConnected::new("sparse_fc3", N_CLASSES, HIDDEN_UNITS, identity)
                .densify()
                .build(rng),
        ];
        Self { layers }
    }

    /// The built layers, first to last.
    pub fn layers(&self) -> &[SparseLayer; 3] {
        &self.layers
    }

    /// Runs the network forward, producing dense logits of shape
    /// `[batch, N_CLASSES]` and the gradient tape for this pass.
    pub fn forward(&self, x: &SparseTensor) -> Result<(Tensor<f64>, SparseNetTape), SparseError> {
        let (h1, back1) = self.layers[0].forward(x)?;
        let h1 = h1.into_sparse();
        let (h2, back2) = self.layers[1].forward(&h1)?;
        let h2 = h2.into_sparse();
        let (logits, back3) = self.layers[2].forward(&h2)?;
        let logits = match logits {
            LayerOutput::Dense(t) => t,
            LayerOutput::Sparse(_) => unreachable!("final layer densifies"),
        };
        Ok((
            logits,
            SparseNetTape {
                backs: [back1, back2, back3],
            },
        ))
    }

    /// Adds a set of per-layer gradients into the layers' gradient buffers.
    pub fn accumulate(&mut self, grads: &SparseNetGrads) {
        for (layer, g) in self.layers.iter_mut().zip(&grads.w) {
            for (acc, val) in layer.weights_mut().grad.data.iter_mut().zip(g) {
                *acc += val;
            }
        }
    }

    /// Applies one SGD step per layer and zeros the gradient buffers.
    pub fn step(&mut self, lr: f64) {
        for layer in &mut self.layers {
            backprop::sgd(layer.weights_mut(), lr);
        }
    }

    /// Runs one training step on a batch: forward, loss, backward, SGD.
    ///
    /// # Returns
    /// `(mean loss, accuracy)` over the batch.
    pub fn train_batch(
        &mut self,
        x: &SparseTensor,
        targets: &Tensor<f64>,
        lr: f64,
    ) -> Result<(f64, f64), SparseError> {
        let (logits, tape) = self.forward(x)?;
        let (loss, back_loss) = backprop::softmax_cross_entropy(&logits, targets);
        let acc = backprop::accuracy(&logits, targets);

        let grad_logits = back_loss(1.0);
        let grads = tape.backward(&grad_logits);
        self.accumulate(&grads);
        self.step(lr);

        Ok((loss, acc))
    }

    /// Evaluates a batch without touching the weights.
    ///
    /// # Returns
    /// `(mean loss, accuracy)` over the batch.
    pub fn evaluate(&self, x: &SparseTensor, targets: &Tensor<f64>) -> Result<(f64, f64), SparseError> {
        let (logits, _) = self.forward(x)?;
        let (loss, _) = backprop::softmax_cross_entropy(&logits, targets);
        Ok((loss, backprop::accuracy(&logits, targets)))
    }

    /// Saves every layer's value vector to a checkpoint, keyed by layer name.
    pub fn save(&self, path: &str) -> Result<(), SparseError> {
        let entries: Vec<(String, Tensor<f64>)> = self
            .layers
            .iter()
            .map(|l| (format!("{}/weights", l.name()), l.weights().value.clone()))
            .collect();
        modelio::save_checkpoint(path, &entries).map_err(checkpoint_err)
    }

    /// Restores every layer's value vector from a checkpoint by name.
    ///
    /// Each layer is looked up and restored independently; a missing name or
    /// a shape disagreement fails without touching the remaining layers.
    pub fn load(&mut self, path: &str) -> Result<(), SparseError> {
        let entries = modelio::load_checkpoint(path).map_err(checkpoint_err)?;
        for layer in &mut self.layers {
            let key = format!("{}/weights", layer.name());
            let tensor = entries
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| SparseError::Checkpoint(format!("missing tensor {key}")))?;
            if tensor.shape != layer.weights().value.shape {
                return Err(SparseError::ShapeMismatch {
                    name: key,
                    expected: layer.weights().value.shape.clone(),
                    got: tensor.shape,
                });
            }
            layer.weights_mut().value = tensor;
        }
        Ok(())
    }
}

/// Sorts a checkpoint failure into the error taxonomy: file-level failures
/// become [`SparseError::Io`], everything else stays a content error.
fn checkpoint_err(err: Box<dyn std::error::Error>) -> SparseError {
    match err.downcast::<std::io::Error>() {
        Ok(io) => SparseError::Io(*io),
        Err(other) => SparseError::Checkpoint(other.to_string()),
    }
}
