//! Robust saving/loading of named model weights.
//!
//! # `.spat` Checkpoint Format
//!
//! This module provides minimal utilities for saving and loading named tensors
//! in a custom binary format, so each layer's value vector is independently
//! restorable by name.
//!
//! # Format Overview
//!
//! A `.spat` file stores one or more named tensors in the following layout:
//!
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ Header     │ Entry N, Entry N+1 …         │
//! ├────────────┼──────────────────────────────┤
//! │ "spat"[4]  │ u16: name length             │
//! │ u8: count  │ [u8; len] UTF-8 name         │
//! │            │ u64: ndim                    │
//! │            │ [u64; ndim] shape            │
//! │            │ [f64; prod(shape)] data      │
//! └────────────┴──────────────────────────────┘
//! ```
//!
//! All integers and floats are little-endian.
//!
//! # Design Principles
//! - Fully self-contained, no compression
//! - Deterministic, reproducible serialization
//! - Loaded entries are validated (shape/data agreement) before use
//!
//! # Limitations
//! - Assumes `f64` element type
//! - Maximum 255 tensors per file (due to `u8` count limit)
//!
//! # Example
//!
//! ```rust,no_run
//! use sparsegrad::sparse::Tensor;
//! use sparsegrad::modelio::{save_checkpoint, load_checkpoint};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let w = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
//!     save_checkpoint("model.spat", &[("fc/weights".to_string(), w)])?;
//!     let entries = load_checkpoint("model.spat")?;
//!     assert_eq!(entries[0].0, "fc/weights");
//!     Ok(())
//! }
//! ```

use briny::prelude::*;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use crate::sparse::Tensor;

const SPAT_MAGIC: &[u8; 4] = b"spat";

/// Internal representation of a packed named tensor.
struct PackedTensor {
    name: String,
    shape: Vec<u64>,
    data: Vec<f64>,
}

impl Validate for PackedTensor {
    fn validate(&self) -> Result<(), ValidationError> {
        let expected = self.shape.iter().product::<u64>() as usize;
        if self.data.len() != expected || self.name.is_empty() {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Save a list of named tensors to a `.spat` file.
///
/// # Arguments
/// - `path`: Output file path.
/// - `entries`: `(name, tensor)` pairs to save.
///
/// # Errors
/// - Returns an error if file I/O fails or a name exceeds `u16::MAX` bytes.
///
/// # Panics
/// - Panics if more than 255 entries are given, or a tensor's shape and data
///   disagree.
pub fn save_checkpoint(path: &str, entries: &[(String, Tensor<f64>)]) -> Result<(), Box<dyn Error>> {
    assert!(entries.len() <= u8::MAX as usize, "too many tensors for one checkpoint");
    let mut file = BufWriter::new(File::create(path)?);

    file.write_all(SPAT_MAGIC)?;
    file.write_all(&[entries.len() as u8])?;

    for (name, tensor) in entries {
        assert_eq!(
            tensor.data.len(),
            tensor.shape.iter().product(),
            "tensor shape/data mismatch"
        );
        let name_bytes = name.as_bytes();
        let name_len =
            u16::try_from(name_bytes.len()).map_err(|_| format!("tensor name too long: {name}"))?;
        file.write_all(&name_len.to_le_bytes())?;
        file.write_all(name_bytes)?;

        let dims = tensor.shape.len() as u64;
        file.write_all(&dims.to_le_bytes())?;
        for &dim in &tensor.shape {
            file.write_all(&(dim as u64).to_le_bytes())?;
        }
        for &val in &tensor.data {
            file.write_all(&val.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Load a `.spat` file containing named tensors.
///
/// - Validates the magic header and every entry's shape/data agreement.
/// - Assumes all data is `f64`, little-endian encoded.
///
/// # Returns
/// - The `(name, tensor)` pairs in file order.
///
/// # Errors
/// - Fails if the file does not start with `spat`, is truncated, or contains
///   an entry whose shape disagrees with its data length.
pub fn load_checkpoint(path: &str) -> Result<Vec<(String, Tensor<f64>)>, Box<dyn Error>> {
    let mut file = BufReader::new(File::open(path)?);
    let mut buf8 = [0u8; 8];

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != SPAT_MAGIC {
        return Err("invalid magic header".into());
    }

    let mut count = [0u8; 1];
    file.read_exact(&mut count)?;
    let count = count[0] as usize;

    let mut entries = Vec::with_capacity(count);

    for _ in 0..count {
        let mut buf2 = [0u8; 2];
        file.read_exact(&mut buf2)?;
        let name_len = u16::from_le_bytes(buf2) as usize;
        let mut name_bytes = vec![0u8; name_len];
        file.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes).map_err(|_| "tensor name is not UTF-8")?;

        file.read_exact(&mut buf8)?;
        let ndim = u64::from_le_bytes(buf8) as usize;

        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            file.read_exact(&mut buf8)?;
            shape.push(u64::from_le_bytes(buf8));
        }

        let size: usize = shape.iter().product::<u64>() as usize;
        let mut data = Vec::with_capacity(size);
        for _ in 0..size {
            file.read_exact(&mut buf8)?;
            data.push(f64::from_le_bytes(buf8));
        }

        let raw = PackedTensor { name, shape, data };
        let trusted = TrustedData::new(raw)?;
        let inner = trusted.into_inner();
        let shape_usize: Vec<usize> = inner.shape.iter().map(|&x| x as usize).collect();
        entries.push((inner.name, Tensor::new(shape_usize, inner.data)));
    }

    Ok(entries)
}
