use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One entry of a vector collection: embedding, sparse metadata and an
/// optional source document. An empty `id` marks a record whose source did
/// not carry one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
	pub id: String,
	pub vector: Vec<f32>,
	pub metadata: BTreeMap<String, Value>,
	pub document: Option<String>,
}

impl Record {
	/// Document text, or `""` when absent.
	pub fn document_text(&self) -> &str {
		self.document.as_deref().unwrap_or("")
	}

	pub fn has_document(&self) -> bool {
		!self.document_text().is_empty()
	}

	/// Length of the document in characters.
	pub fn document_len(&self) -> usize {
		self.document_text().chars().count()
	}

	/// True when the field exists with a non-null value.
	pub fn has_field(&self, name: &str) -> bool {
		matches!(self.metadata.get(name), Some(v) if !v.is_null())
	}

	/// True when the field exists, is non-null and is not an empty or
	/// whitespace-only string.
	pub fn field_filled(&self, name: &str) -> bool {
		match self.metadata.get(name) {
			None | Some(Value::Null) => false,
			Some(Value::String(s)) => !s.trim().is_empty(),
			Some(_) => true,
		}
	}
}

// ---------------------------------------------------------------------------
// Profile report
// ---------------------------------------------------------------------------

/// Summary statistics over a list of numbers. `defined` is false when the
/// list was empty, in which case every number is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
	pub defined: bool,
	pub count: usize,
	pub min: f64,
	pub max: f64,
	pub mean: f64,
	pub p25: f64,
	pub p50: f64,
	pub p75: f64,
	pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCoverage {
	pub count: usize,
	pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCount {
	pub term: String,
	pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
	pub value: String,
	pub count: usize,
}

/// Observed range of the configured recency field, in epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyRange {
	pub field: String,
	pub parsed: usize,
	pub min: f64,
	pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
	MissingId,
	DimensionMismatch,
	DuplicateId,
}

/// A record that was counted but kept out of scoring and selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
	pub index: usize,
	pub id: String,
	pub kind: AnomalyKind,
	pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSummary {
	pub groups: usize,
	pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
	pub num_records: usize,
	pub embedding_dim: Option<usize>,
	pub field_coverage: BTreeMap<String, FieldCoverage>,
	pub has_document_ratio: f64,
	pub doc_length_stats: Distribution,
	pub embedding_norm_stats: Distribution,
	pub top_terms: Vec<TermCount>,
	pub top_values: BTreeMap<String, Vec<ValueCount>>,
	pub unique_ids: usize,
	pub duplicate_ids: Vec<String>,
	pub recency: Option<RecencyRange>,
	pub duplicates: DuplicateSummary,
	pub anomalies: Vec<Anomaly>,
	/// p95 document length over well-formed records with a document.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub richness_cap: Option<f64>,
}

impl ProfileReport {
	/// Indices of records excluded from scoring and selection.
	pub fn anomalous_indices(&self) -> Vec<usize> {
		let mut indices: Vec<usize> = self.anomalies.iter().map(|a| a.index).collect();
		indices.sort_unstable();
		indices.dedup();
		indices
	}
}

// ---------------------------------------------------------------------------
// Duplicate groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
	pub id: usize,
	pub members: Vec<String>,
	pub size: usize,
}

/// Partition of the duplicated records. Records without duplicates have no
/// entry in `by_record`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMap {
	pub by_record: BTreeMap<String, usize>,
	pub groups: Vec<DuplicateGroup>,
}

impl DuplicateMap {
	pub fn group_of(&self, id: &str) -> Option<usize> {
		self.by_record.get(id).copied()
	}

	pub fn summary(&self) -> DuplicateSummary {
		DuplicateSummary {
			groups: self.groups.len(),
			records: self.by_record.len(),
		}
	}
}

// ---------------------------------------------------------------------------
// Scores and selection
// ---------------------------------------------------------------------------

/// Per-term contributions. A `None` term was left out of the weighted sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
	pub completeness: Option<f64>,
	pub richness: Option<f64>,
	pub recency: Option<f64>,
	pub duplicate_penalized: bool,
}

/// A record paired with its transient score. Borrows the source record.
#[derive(Debug, Clone)]
pub struct ScoredRecord<'a> {
	pub record: &'a Record,
	pub score: f64,
	pub breakdown: ScoreBreakdown,
	pub group: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedRecord {
	pub id: String,
	pub metadata: BTreeMap<String, Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vector: Option<Vec<f32>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vector_b64: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub score: Option<f64>,
}

pub type SelectionResult = Vec<SelectedRecord>;
