//! Synthetic XOR-style dataset and batching.
//!
//! # Dataset
//!
//! Samples live in a [`N_FEATURES`]-wide feature space but populate only the
//! five fixed columns in [`FEATURE_COLS`]; every other coordinate is zero and
//! never stored. The populated values are standard-normal draws, and the label
//! is the xor of the first two values' signs:
//!
//! ```text
//! label = (v0 < 0) != (v1 < 0)
//! ```
//!
//! so opposite-sign pairs are class 1 and same-sign pairs are class 0.
//!
//! [`Dataset::batches`] reshuffles the sample order on every call and yields
//! `(sparse input, one-hot target)` pairs, which is exactly what
//! [`crate::model::SparseNet`] consumes. A trailing batch shorter than
//! `batch_size` is yielded as-is.

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, StandardNormal};

use crate::model::N_CLASSES;
use crate::sparse::{SparseTensor, Tensor};

/// Width of the feature space.
pub const N_FEATURES: usize = 50;

/// The fixed columns every sample populates.
pub const FEATURE_COLS: [usize; 5] = [2, 11, 23, 34, 47];

/// One sample: the five populated feature values and a class label.
#[derive(Debug, Clone)]
pub struct Sample {
    pub values: [f64; FEATURE_COLS.len()],
    pub label: usize,
}

/// The synthetic label rule: xor of the first two values' signs.
pub fn xor_label(v0: f64, v1: f64) -> usize {
    usize::from((v0 < 0.0) != (v1 < 0.0))
}

/// A labeled collection of sparse samples.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Draws `n` samples with standard-normal feature values and xor-of-signs
    /// labels.
    pub fn synthetic(n: usize, rng: &mut impl Rng) -> Self {
        let samples = (0..n)
            .map(|_| {
                let mut values = [0.0; FEATURE_COLS.len()];
                for v in &mut values {
                    *v = StandardNormal.sample(rng);
                }
                Sample {
                    label: xor_label(values[0], values[1]),
                    values,
                }
            })
            .collect();
        Self { samples }
    }

    /// Wraps pre-made samples.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates the dataset once in a freshly shuffled order, yielding
    /// `(sparse input, one-hot target)` batches.
    pub fn batches(&self, batch_size: usize, rng: &mut impl Rng) -> Batches<'_> {
        assert!(batch_size > 0, "batch size must be positive");
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(rng);
        Batches {
            dataset: self,
            order,
            batch_size,
            cursor: 0,
        }
    }

    /// Assembles the given samples into a sparse input batch and a one-hot
    /// target tensor.
    fn assemble(&self, picks: &[usize]) -> (SparseTensor, Tensor<f64>) {
        let batch = picks.len();
        let mut indices = Vec::with_capacity(batch * FEATURE_COLS.len());
        let mut values = Vec::with_capacity(batch * FEATURE_COLS.len());
        let mut targets = vec![0.0; batch * N_CLASSES];

        for (row, &i) in picks.iter().enumerate() {
            let sample = &self.samples[i];
            for (&col, &v) in FEATURE_COLS.iter().zip(&sample.values) {
                indices.push([row, col]);
                values.push(v);
            }
            targets[row * N_CLASSES + sample.label] = 1.0;
        }

        (
            SparseTensor::new(indices, values, [batch, N_FEATURES]),
            Tensor::new(vec![batch, N_CLASSES], targets),
        )
    }
}

/// One shuffled pass over a [`Dataset`] in batches.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = (SparseTensor, Tensor<f64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let picks = &self.order[self.cursor..end];
        self.cursor = end;
        Some(self.dataset.assemble(picks))
    }
}
