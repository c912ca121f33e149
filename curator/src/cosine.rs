// ---------------------------------------------------------------------------
// Vector math — magnitudes, cosine similarity, unit projection
// ---------------------------------------------------------------------------

/// L2 norm of an embedding, accumulated in f64.
pub fn magnitude(embedding: &[f32]) -> f64 {
	embedding
		.iter()
		.map(|&v| {
			let v = v as f64;
			v * v
		})
		.sum::<f64>()
		.sqrt()
}

/// Cosine similarity between two embeddings.
///
/// Returns 0.0 for empty inputs, mismatched dimensions and zero-magnitude
/// vectors. The result is clamped to [-1.0, 1.0].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
	cosine_with_magnitudes(a, b, magnitude(a), magnitude(b))
}

/// Cosine similarity with magnitudes already known.
pub fn cosine_with_magnitudes(a: &[f32], b: &[f32], mag_a: f64, mag_b: f64) -> f64 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}
	let denom = mag_a * mag_b;
	if denom == 0.0 {
		return 0.0;
	}
	let dot: f64 = a
		.iter()
		.zip(b)
		.map(|(&x, &y)| (x as f64) * (y as f64))
		.sum();
	let sim = dot / denom;
	if !sim.is_finite() {
		return 0.0;
	}
	sim.clamp(-1.0, 1.0)
}

/// Scale an embedding to unit length. `None` for zero or non-finite norms.
pub fn unit_vector(embedding: &[f32]) -> Option<Vec<f64>> {
	let mag = magnitude(embedding);
	if mag == 0.0 || !mag.is_finite() {
		return None;
	}
	Some(embedding.iter().map(|&v| v as f64 / mag).collect())
}
