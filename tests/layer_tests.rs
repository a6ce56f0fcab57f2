use rand::SeedableRng;
use rand::rngs::StdRng;
use sparsegrad::data::{Dataset, FEATURE_COLS, N_FEATURES, Sample, xor_label};
use sparsegrad::layer::{Activation, SparseError, SparseFullyConnected};
use sparsegrad::model::{N_CLASSES, SparseNet};
use sparsegrad::modelio::save_checkpoint;
use sparsegrad::sparse::{SparseTensor, Tensor, cross_pattern};

fn sample_input(batch: usize) -> SparseTensor {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for row in 0..batch {
        for (j, &col) in [0usize, 2].iter().enumerate() {
            indices.push([row, col]);
            values.push((row * 2 + j) as f64 - 1.5);
        }
    }
    SparseTensor::new(indices, values, [batch, 4])
}

#[test]
fn test_build_derives_cross_product_pattern() {
    let mut rng = StdRng::seed_from_u64(1);
    let layer = SparseFullyConnected::new("fc", 3, 4, vec![0, 2]).build(&mut rng);

    assert_eq!(layer.n_units_out(), 3);
    assert_eq!(layer.pattern(), cross_pattern(3, &[0, 2]));
    assert_eq!(layer.weights().value.shape, vec![6]);
    assert_eq!(layer.weights().grad.data, vec![0.0; 6]);
}

#[test]
fn test_glorot_init_is_bounded() {
    let mut rng = StdRng::seed_from_u64(2);
    let layer = SparseFullyConnected::new("fc", 8, 16, (0..16).collect()).build(&mut rng);

    let limit = (6.0 / (16 + 8) as f64).sqrt();
    assert!(layer.weights().value.data.iter().all(|v| v.abs() < limit));
    assert!(layer.weights().value.data.iter().any(|v| *v != 0.0));
}

#[test]
fn test_duplicate_input_columns_panic() {
    let result = std::panic::catch_unwind(|| {
        SparseFullyConnected::new("fc", 2, 4, vec![0, 0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_forward_reuses_built_state() {
    let mut rng = StdRng::seed_from_u64(3);
    let layer = SparseFullyConnected::new("fc", 3, 4, vec![0, 2]).build(&mut rng);
    let x = sample_input(2);

    let pattern_before = layer.pattern().to_vec();
    let weights_before = layer.weights().value.clone();

    let (out1, _) = layer.forward(&x).unwrap();
    let (out2, _) = layer.forward(&x).unwrap();

    assert_eq!(out1.into_sparse(), out2.into_sparse());
    assert_eq!(layer.pattern(), pattern_before);
    assert_eq!(layer.weights().value, weights_before);
}

#[test]
fn test_strict_layer_rejects_pattern_mismatch() {
    let mut rng = StdRng::seed_from_u64(4);
    let layer = SparseFullyConnected::new("fc", 3, 4, vec![0, 2]).build(&mut rng);

    // row 0 populates column 1 instead of column 2
    let x = SparseTensor::new(vec![[0, 0], [0, 1]], vec![1.0, 1.0], [1, 4]);
    let err = layer.forward(&x).err().expect("expected PatternMismatch");
    match err {
        SparseError::PatternMismatch { row, expected, got, .. } => {
            assert_eq!(row, 0);
            assert_eq!(expected, vec![0, 2]);
            assert_eq!(got, vec![0, 1]);
        }
        other => panic!("expected PatternMismatch, got {other}"),
    }
}

#[test]
fn test_lenient_layer_treats_missing_entries_as_zero() {
    let mut rng = StdRng::seed_from_u64(5);
    let layer = SparseFullyConnected::new("fc", 3, 4, vec![0, 2])
        .lenient_pattern()
        .build(&mut rng);

    // column 2 missing entirely: contributes zero instead of failing
    let x = SparseTensor::new(vec![[0, 0]], vec![2.0], [1, 4]);
    let (out, _) = layer.forward(&x).unwrap();
    let out = out.into_sparse();

    let w = layer.weight_tensor().to_dense();
    for unit in 0..3 {
        let expected = w.data[unit * 4] * 2.0;
        assert!((out.values[unit] - expected).abs() < 1e-12);
    }
}

#[test]
fn test_densified_output_equals_scatter_add() {
    let config = SparseFullyConnected::new("fc", 3, 4, vec![0, 2]).activation(Activation::Relu);

    let mut rng = StdRng::seed_from_u64(6);
    let sparse_layer = config.clone().build(&mut rng);
    let mut rng = StdRng::seed_from_u64(6);
    let dense_layer = config.densify().build(&mut rng);

    let x = sample_input(2);
    let (sparse_out, _) = sparse_layer.forward(&x).unwrap();
    let (dense_out, _) = dense_layer.forward(&x).unwrap();

    assert_eq!(dense_out.into_dense(), sparse_out.into_sparse().to_dense());
}

#[test]
fn test_relu_layer_masks_backward() {
    let mut rng = StdRng::seed_from_u64(7);
    let layer = SparseFullyConnected::new("fc", 3, 4, vec![0, 2])
        .activation(Activation::Relu)
        .build(&mut rng);

    let x = sample_input(1);
    let (out, back) = layer.forward(&x).unwrap();
    let out = out.into_sparse();

    let (w_grad, _) = back(&[1.0, 1.0, 1.0]);

    // wherever the activated output is zero, no gradient reaches the weights
    for (unit, &v) in out.values.iter().enumerate() {
        if v == 0.0 {
            for j in 0..2 {
                assert_eq!(w_grad[unit * 2 + j], 0.0);
            }
        }
    }
}

#[test]
fn test_model_forward_shape() {
    let mut rng = StdRng::seed_from_u64(8);
    let model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);
    let dataset = Dataset::synthetic(6, &mut rng);

    let (x, y) = dataset.batches(6, &mut rng).next().unwrap();
    let (logits, _) = model.forward(&x).unwrap();

    assert_eq!(logits.shape, vec![6, N_CLASSES]);
    assert_eq!(y.shape, vec![6, N_CLASSES]);
}

#[test]
fn test_xor_label_rule() {
    // opposite-sign first two features => class 1
    assert_eq!(xor_label(-0.3, 0.8), 1);
    assert_eq!(xor_label(0.3, -0.8), 1);
    assert_eq!(xor_label(0.3, 0.8), 0);
    assert_eq!(xor_label(-0.3, -0.8), 0);

    let samples = vec![
        Sample {
            values: [-1.0, 1.0, 0.5, 0.5, 0.5],
            label: xor_label(-1.0, 1.0),
        },
        Sample {
            values: [2.0, -0.1, 0.5, 0.5, 0.5],
            label: xor_label(2.0, -0.1),
        },
    ];
    let dataset = Dataset::from_samples(samples);
    let mut rng = StdRng::seed_from_u64(9);
    let (_, targets) = dataset.batches(2, &mut rng).next().unwrap();

    // both rows are one-hot class 1
    for row in 0..2 {
        assert_eq!(targets.data[row * N_CLASSES], 0.0);
        assert_eq!(targets.data[row * N_CLASSES + 1], 1.0);
    }
}

#[test]
fn test_batches_cover_dataset_with_short_tail() {
    let mut rng = StdRng::seed_from_u64(10);
    let dataset = Dataset::synthetic(10, &mut rng);
    assert!(!dataset.is_empty());
    assert_eq!(dataset.len(), 10);

    let sizes: Vec<usize> = dataset
        .batches(4, &mut rng)
        .map(|(x, y)| {
            assert_eq!(x.shape[1], N_FEATURES);
            assert_eq!(y.shape[0], x.shape[0]);
            x.shape[0]
        })
        .collect();

    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(sizes.iter().sum::<usize>(), dataset.len());
}

#[test]
fn test_batch_rows_match_feature_pattern() {
    let mut rng = StdRng::seed_from_u64(11);
    let dataset = Dataset::synthetic(8, &mut rng);
    let (x, _) = dataset.batches(8, &mut rng).next().unwrap();

    let mut expected: Vec<usize> = FEATURE_COLS.to_vec();
    expected.sort_unstable();
    for row in 0..8 {
        assert_eq!(x.row_cols(row), expected);
    }
}

#[test]
fn test_checkpoint_roundtrip_by_name() {
    let path = "test_model.spat";
    let mut rng = StdRng::seed_from_u64(12);
    let model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);
    model.save(path).unwrap();

    let mut restored = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);
    restored.load(path).unwrap();

    for (a, b) in model.layers().iter().zip(restored.layers()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.weights().value, b.weights().value);
    }

    std::fs::remove_file(path).ok();
}

#[test]
fn test_load_rejects_shape_mismatch() {
    let path = "test_badshape.spat";
    let wrong = Tensor::new(vec![3], vec![1.0, 2.0, 3.0]);
    save_checkpoint(path, &[("sparse_fc1/weights".to_string(), wrong)]).unwrap();

    let mut rng = StdRng::seed_from_u64(14);
    let mut model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);
    let before = model.layers()[0].weights().value.clone();

    let err = model.load(path).err().expect("expected ShapeMismatch");
    match err {
        SparseError::ShapeMismatch { name, expected, got } => {
            assert_eq!(name, "sparse_fc1/weights");
            assert_eq!(expected, before.shape);
            assert_eq!(got, vec![3]);
        }
        other => panic!("expected ShapeMismatch, got {other}"),
    }
    // the failed restore leaves the weights untouched
    assert_eq!(model.layers()[0].weights().value, before);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_load_surfaces_io_errors() {
    let mut rng = StdRng::seed_from_u64(15);
    let mut model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);

    let err = model
        .load("no_such_dir/model.spat")
        .err()
        .expect("expected Io");
    assert!(matches!(err, SparseError::Io(_)), "got {err}");
}

#[test]
fn test_training_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(13);
    let dataset = Dataset::synthetic(256, &mut rng);
    let mut model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);

    let epoch_loss = |model: &mut SparseNet, rng: &mut StdRng| -> f64 {
        let mut total = 0.0;
        let mut n = 0;
        for (x, y) in dataset.batches(32, rng) {
            let (loss, _) = model.train_batch(&x, &y, 0.05).unwrap();
            total += loss;
            n += 1;
        }
        total / n as f64
    };

    let first = epoch_loss(&mut model, &mut rng);
    let mut last = first;
    for _ in 0..20 {
        last = epoch_loss(&mut model, &mut rng);
    }
    assert!(
        last < first,
        "loss should fall over training: first={first}, last={last}"
    );
}
