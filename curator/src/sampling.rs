//! Fixture sampling.
//!
//! Draws a small random subset of an exported selection for use as test and
//! CI fixtures.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::error::CuratorError;

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
	match seed {
		Some(seed) => ChaCha8Rng::seed_from_u64(seed),
		None => ChaCha8Rng::from_rng(&mut rand::rng()),
	}
}

/// Pick `size` distinct entries from `entries` in random order.
///
/// Fails with `NotEnoughRecords` when fewer than `size` entries exist. The
/// same seed always yields the same sample.
pub fn sample_records(
	entries: Vec<Value>,
	size: usize,
	seed: Option<u64>,
) -> Result<Vec<Value>, CuratorError> {
	if entries.len() < size {
		return Err(CuratorError::NotEnoughRecords {
			requested: size,
			available: entries.len(),
		});
	}

	let mut rng = create_rng(seed);
	let mut indices: Vec<usize> = (0..entries.len()).collect();
	indices.shuffle(&mut rng);
	indices.truncate(size);

	let mut slots: Vec<Option<Value>> = entries.into_iter().map(Some).collect();
	let sample = indices
		.into_iter()
		.filter_map(|i| slots[i].take())
		.collect();

	tracing::info!(size, seeded = seed.is_some(), "Sampled records");
	Ok(sample)
}
