// ============================================================
// Layer 4 - Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and splits them into:
//   - Training set:   used to update model weights
//   - Validation set: used for early stopping and val metrics
//
// Label files are grouped by category, so without the shuffle
// the validation set would only hold the last few labels.
//
// The split is reproducible: same samples + same seed → same
// split. The training side always keeps at least one sample;
// a validation fraction of 0 yields an empty validation set.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom on a
// StdRng seeded from the training options.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// # Arguments
/// * `samples`             - All available samples (consumed)
/// * `validation_fraction` - Proportion held out, e.g. 0.1 = 10%
/// * `seed`                - Shuffle seed
pub fn split_train_val<T>(
    mut samples: Vec<T>,
    validation_fraction: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total = samples.len();
    let wanted = ((total as f64) * validation_fraction.clamp(0.0, 1.0)).round() as usize;
    // Never take the last training sample.
    let val_count = wanted.min(total.saturating_sub(1));

    let val = samples.split_off(total - val_count);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}
