use rand::SeedableRng;
use rand::rngs::StdRng;
use sparsegrad::data::{Dataset, FEATURE_COLS, N_FEATURES};
use sparsegrad::model::SparseNet;

const PATH_TO_MODEL: &str = "xor_model.spat";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    const TRAIN_SAMPLES: usize = 2048;
    const VAL_SAMPLES: usize = 512;
    const BATCH_SIZE: usize = 32;
    const EPOCHS: usize = 50;
    const LR: f64 = 0.05;

    let mut rng = StdRng::seed_from_u64(7);

    let train = Dataset::synthetic(TRAIN_SAMPLES, &mut rng);
    let val = Dataset::synthetic(VAL_SAMPLES, &mut rng);

    let mut model = SparseNet::new(N_FEATURES, &FEATURE_COLS, &mut rng);

    if model.load(PATH_TO_MODEL).is_ok() {
        println!("Restored checkpoint from {PATH_TO_MODEL}");
    }

    println!("Beginning training...");

    for epoch in 0..EPOCHS {
        let mut loss_accum = 0.0;
        let mut acc_accum = 0.0;
        let mut n_batches = 0;

        for (x, y) in train.batches(BATCH_SIZE, &mut rng) {
            let (loss, acc) = model.train_batch(&x, &y, LR)?;
            loss_accum += loss;
            acc_accum += acc;
            n_batches += 1;
        }

        if (epoch + 1) % 5 == 0 {
            let mut val_loss = 0.0;
            let mut val_acc = 0.0;
            let mut val_batches = 0;
            for (x, y) in val.batches(BATCH_SIZE, &mut rng) {
                let (loss, acc) = model.evaluate(&x, &y)?;
                val_loss += loss;
                val_acc += acc;
                val_batches += 1;
            }

            println!(
                "Epoch {:3}: train_loss={:.6} train_acc={:.2}% val_loss={:.6} val_acc={:.2}%",
                epoch + 1,
                loss_accum / n_batches as f64,
                100.0 * acc_accum / n_batches as f64,
                val_loss / val_batches as f64,
                100.0 * val_acc / val_batches as f64
            );

            model.save(PATH_TO_MODEL)?;
        }
    }

    model.save(PATH_TO_MODEL)?;
    println!("Model saved to {PATH_TO_MODEL}");

    Ok(())
}
