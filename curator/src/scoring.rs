// ---------------------------------------------------------------------------
// Richness scoring — weighted completeness / richness / recency per record
// ---------------------------------------------------------------------------
//
// Pure functions. Collection-wide inputs (length cap, recency range,
// duplicate groups) come from the finished profile report and duplicate map;
// nothing here re-derives them from the records.
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use crate::config::{CurationConfig, ScoreWeights};
use crate::profiler::parse_timestamp;
use crate::types::{DuplicateMap, ProfileReport, RecencyRange, Record, ScoreBreakdown, ScoredRecord};

// ---------------------------------------------------------------------------
// Weight normalization
// ---------------------------------------------------------------------------

/// Weights of the terms that take part in a run, scaled to sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWeights {
	pub completeness: f64,
	pub richness: f64,
	pub recency: f64,
}

/// Scale the configured weights over the terms that are present. An omitted
/// term gets weight 0 and its share goes to the others. All-zero input
/// yields all-zero weights.
pub fn normalize_weights(
	weights: &ScoreWeights,
	completeness: bool,
	richness: bool,
	recency: bool,
) -> ActiveWeights {
	let c = if completeness { weights.completeness } else { 0.0 };
	let r = if richness { weights.richness } else { 0.0 };
	let t = if recency { weights.recency } else { 0.0 };
	let total = c + r + t;
	if total <= 0.0 {
		return ActiveWeights {
			completeness: 0.0,
			richness: 0.0,
			recency: 0.0,
		};
	}
	ActiveWeights {
		completeness: c / total,
		richness: r / total,
		recency: t / total,
	}
}

// ---------------------------------------------------------------------------
// Individual terms
// ---------------------------------------------------------------------------

/// Fraction of `key_fields` that are present and non-empty on `record`.
/// `None` when no key fields are configured.
pub fn completeness_score(record: &Record, key_fields: &[String]) -> Option<f64> {
	if key_fields.is_empty() {
		return None;
	}
	let filled = key_fields.iter().filter(|f| record.field_filled(f)).count();
	Some(filled as f64 / key_fields.len() as f64)
}

/// Document length relative to `cap`, capped at 1.0.
pub fn richness_score(record: &Record, cap: f64) -> f64 {
	(record.document_len() as f64 / cap).min(1.0)
}

/// Linear position of the record's timestamp within `range`.
///
/// Records without a parseable timestamp score 0. When every timestamp is
/// the same, each timestamped record scores 1. Offsets are taken on halved
/// values so that `max - min` cannot overflow to infinity.
pub fn recency_score(record: &Record, range: &RecencyRange) -> f64 {
	let Some(ts) = record.metadata.get(&range.field).and_then(parse_timestamp) else {
		return 0.0;
	};
	let span = range.max / 2.0 - range.min / 2.0;
	if !(span > 0.0 && span.is_finite()) {
		return 1.0;
	}
	let position = (ts / 2.0 - range.min / 2.0) / span;
	if position.is_nan() {
		return 0.0;
	}
	position.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Combined score
// ---------------------------------------------------------------------------

/// Weighted sum of the present terms, clamped to [0, 1]. A non-finite sum
/// scores 0.
pub fn combine(breakdown: &ScoreBreakdown, weights: &ActiveWeights) -> f64 {
	let mut score = 0.0;
	if let Some(c) = breakdown.completeness {
		score += c * weights.completeness;
	}
	if let Some(r) = breakdown.richness {
		score += r * weights.richness;
	}
	if let Some(t) = breakdown.recency {
		score += t * weights.recency;
	}
	if !score.is_finite() {
		return 0.0;
	}
	score.clamp(0.0, 1.0)
}

/// Score every record at `eligible`.
///
/// Within a duplicate group the best-scoring member (ties by smaller id) is
/// the representative; every other member loses the `duplicate_penalty`
/// fraction of its score. Output order follows `eligible`.
pub fn score_records<'a>(
	records: &'a [Record],
	eligible: &[usize],
	profile: &ProfileReport,
	duplicates: &DuplicateMap,
	config: &CurationConfig,
) -> Vec<ScoredRecord<'a>> {
	let length_cap = profile.richness_cap;
	let recency_range = if config.recency_field.is_some() {
		profile.recency.as_ref()
	} else {
		None
	};

	let weights = normalize_weights(
		&config.score_weights,
		!config.key_fields.is_empty(),
		length_cap.is_some(),
		recency_range.is_some(),
	);

	let mut scored: Vec<ScoredRecord<'a>> = eligible
		.iter()
		.map(|&i| {
			let record = &records[i];
			let breakdown = ScoreBreakdown {
				completeness: completeness_score(record, &config.key_fields),
				richness: length_cap.map(|cap| richness_score(record, cap)),
				recency: recency_range.map(|range| recency_score(record, range)),
				duplicate_penalized: false,
			};
			ScoredRecord {
				record,
				score: combine(&breakdown, &weights),
				breakdown,
				group: duplicates.group_of(&record.id),
			}
		})
		.collect();

	// best member of each group: (position in `scored`, score)
	let mut representative: HashMap<usize, usize> = HashMap::new();
	for (pos, s) in scored.iter().enumerate() {
		let Some(group) = s.group else { continue };
		let best = representative.entry(group).or_insert(pos);
		let current = &scored[*best];
		if s.score > current.score || (s.score == current.score && s.record.id < current.record.id)
		{
			*best = pos;
		}
	}

	let keep = 1.0 - config.score_weights.duplicate_penalty;
	for (pos, s) in scored.iter_mut().enumerate() {
		if let Some(group) = s.group {
			if representative.get(&group) != Some(&pos) {
				s.score *= keep;
				s.breakdown.duplicate_penalized = true;
			}
		}
	}

	tracing::info!(
		records = scored.len(),
		completeness = weights.completeness,
		richness = weights.richness,
		recency = weights.recency,
		"Scored records"
	);
	scored
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
