// ---------------------------------------------------------------------------
// Selector — order, suppress duplicates, truncate, project
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::{CurationConfig, VectorEncoding};
use crate::source::encode_vector;
use crate::types::{ScoredRecord, SelectedRecord, SelectionResult};

/// Descending score, then ascending id.
fn rank(a: &ScoredRecord<'_>, b: &ScoredRecord<'_>) -> Ordering {
	b.score
		.total_cmp(&a.score)
		.then_with(|| a.record.id.cmp(&b.record.id))
}

/// Copy the configured export fields of a scored record.
pub fn project(scored: &ScoredRecord<'_>, config: &CurationConfig) -> SelectedRecord {
	let record = scored.record;
	let metadata = config
		.key_fields
		.iter()
		.filter_map(|f| record.metadata.get(f).map(|v| (f.clone(), v.clone())))
		.collect();

	let (vector, vector_b64) = match (config.include_vector, config.vector_encoding) {
		(false, _) => (None, None),
		(true, VectorEncoding::Float) => (Some(record.vector.clone()), None),
		(true, VectorEncoding::Base64) => (None, Some(encode_vector(&record.vector))),
	};

	SelectedRecord {
		id: record.id.clone(),
		metadata,
		vector,
		vector_b64,
		document: if config.include_document {
			record.document.clone()
		} else {
			None
		},
		score: config.include_score.then_some(scored.score),
	}
}

/// Pick at most `top_n` records by score.
///
/// Unless `allow_duplicates` is set, only the first-ranked member of each
/// duplicate group is eligible. With `require_document`, records without a
/// document are skipped. Fewer eligible records than `top_n` is not an error.
pub fn select(mut scored: Vec<ScoredRecord<'_>>, config: &CurationConfig) -> SelectionResult {
	scored.sort_by(rank);

	let mut taken_groups: HashSet<usize> = HashSet::new();
	let mut suppressed = 0usize;
	let mut selection = Vec::with_capacity(config.top_n.min(scored.len()));

	for s in &scored {
		if selection.len() >= config.top_n {
			break;
		}
		if config.require_document && !s.record.has_document() {
			continue;
		}
		if let Some(group) = s.group {
			if !config.allow_duplicates && !taken_groups.insert(group) {
				suppressed += 1;
				continue;
			}
		}
		selection.push(project(s, config));
	}

	tracing::info!(
		selected = selection.len(),
		suppressed,
		top_n = config.top_n,
		"Selected records"
	);
	selection
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
