// ---------------------------------------------------------------------------
// Similarity search — brute-force top-k by cosine similarity
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::cosine::{cosine_with_magnitudes, magnitude};
use crate::error::CuratorError;
use crate::types::Record;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarRecord {
	pub id: String,
	pub similarity: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document: Option<String>,
}

/// The `top_k` records most similar to `query`, highest similarity first
/// and ties by id. Records of another dimensionality are skipped.
pub fn top_similar(query: &[f32], records: &[Record], top_k: usize) -> Vec<SimilarRecord> {
	let query_mag = magnitude(query);
	let mut scored: Vec<(f64, &Record)> = records
		.iter()
		.filter(|r| r.vector.len() == query.len())
		.map(|r| {
			let sim = cosine_with_magnitudes(query, &r.vector, query_mag, magnitude(&r.vector));
			(sim, r)
		})
		.collect();

	scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
	scored
		.into_iter()
		.take(top_k)
		.map(|(similarity, r)| SimilarRecord {
			id: r.id.clone(),
			similarity,
			document: r.document.clone(),
		})
		.collect()
}

/// Like [`top_similar`], using the vector of the record named `id`.
pub fn top_similar_to_id(
	id: &str,
	records: &[Record],
	top_k: usize,
) -> Result<Vec<SimilarRecord>, CuratorError> {
	let query = records
		.iter()
		.find(|r| r.id == id)
		.ok_or_else(|| CuratorError::RecordNotFound(id.to_string()))?;
	Ok(top_similar(&query.vector, records, top_k))
}
