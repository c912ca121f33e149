// ---------------------------------------------------------------------------
// Profiler — collection-wide statistics in one partitioned pass
// ---------------------------------------------------------------------------
//
// Records are split into fixed-size partitions. Each partition fills a
// `PartitionStats` accumulator; accumulators are merged left to right, and
// every order-sensitive rule (first-seen tie breaks, percentiles) is applied
// only once the merge is complete.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::CurationConfig;
use crate::cosine::magnitude;
use crate::error::CuratorError;
use crate::pipeline::CancellationFlag;
use crate::text::content_terms;
use crate::types::{
	Anomaly, AnomalyKind, Distribution, DuplicateSummary, FieldCoverage, ProfileReport,
	RecencyRange, Record, TermCount, ValueCount,
};

// ---------------------------------------------------------------------------
// Ordered counter
// ---------------------------------------------------------------------------

/// Frequency counter that remembers first-seen order, so that equal counts
/// rank deterministically instead of in hash order.
#[derive(Debug, Default)]
struct OrderedCounter {
	entries: Vec<(String, usize)>,
	index: HashMap<String, usize>,
}

impl OrderedCounter {
	fn add(&mut self, key: &str, n: usize) {
		match self.index.get(key) {
			Some(&i) => self.entries[i].1 += n,
			None => {
				self.index.insert(key.to_string(), self.entries.len());
				self.entries.push((key.to_string(), n));
			}
		}
	}

	/// Fold `other` in after `self`; keys new to `self` keep `other`'s order.
	fn merge(&mut self, other: OrderedCounter) {
		for (key, n) in other.entries {
			self.add(&key, n);
		}
	}

	/// The `k` most frequent keys, ties broken by first-seen order.
	fn top(&self, k: usize) -> Vec<(String, usize)> {
		let mut ranked: Vec<&(String, usize)> = self.entries.iter().collect();
		// stable sort keeps first-seen order among equal counts
		ranked.sort_by(|a, b| b.1.cmp(&a.1));
		ranked.into_iter().take(k).cloned().collect()
	}
}

// ---------------------------------------------------------------------------
// Partition accumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PartitionStats {
	records: usize,
	field_counts: BTreeMap<String, usize>,
	doc_lengths: Vec<f64>,
	eligible_doc_lengths: Vec<f64>,
	norms: Vec<f64>,
	terms: OrderedCounter,
	values: BTreeMap<String, OrderedCounter>,
	timestamps: Vec<f64>,
}

impl PartitionStats {
	fn observe(
		&mut self,
		record: &Record,
		dim: Option<usize>,
		anomalous: bool,
		recency_field: Option<&str>,
	) {
		self.records += 1;

		for (name, value) in &record.metadata {
			if value.is_null() {
				continue;
			}
			*self.field_counts.entry(name.clone()).or_insert(0) += 1;
			if let Value::String(s) = value {
				self.values.entry(name.clone()).or_default().add(s, 1);
			}
		}

		if record.has_document() {
			self.doc_lengths.push(record.document_len() as f64);
			if !anomalous {
				self.eligible_doc_lengths.push(record.document_len() as f64);
			}
			for term in content_terms(record.document_text()) {
				self.terms.add(&term, 1);
			}
		}

		if Some(record.vector.len()) == dim {
			self.norms.push(magnitude(&record.vector));
		}

		if !anomalous {
			if let Some(ts) = recency_field
				.and_then(|f| record.metadata.get(f))
				.and_then(parse_timestamp)
			{
				self.timestamps.push(ts);
			}
		}
	}

	fn merge(&mut self, other: PartitionStats) {
		self.records += other.records;
		for (name, n) in other.field_counts {
			*self.field_counts.entry(name).or_insert(0) += n;
		}
		self.doc_lengths.extend(other.doc_lengths);
		self.eligible_doc_lengths.extend(other.eligible_doc_lengths);
		self.norms.extend(other.norms);
		self.terms.merge(other.terms);
		for (name, counter) in other.values {
			self.values.entry(name).or_default().merge(counter);
		}
		self.timestamps.extend(other.timestamps);
	}
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Linear-interpolated percentile of an ascending slice. `p` in [0, 1].
fn percentile(sorted: &[f64], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.0;
	}
	let pos = p * (sorted.len() - 1) as f64;
	let lo = pos.floor() as usize;
	let hi = pos.ceil() as usize;
	sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Summarise `values`. Empty input yields an undefined, all-zero result.
pub fn distribution(values: &[f64]) -> Distribution {
	if values.is_empty() {
		return Distribution::default();
	}
	let mut sorted = values.to_vec();
	sorted.sort_by(f64::total_cmp);
	let sum: f64 = values.iter().sum();
	Distribution {
		defined: true,
		count: values.len(),
		min: sorted[0],
		max: sorted[sorted.len() - 1],
		mean: sum / values.len() as f64,
		p25: percentile(&sorted, 0.25),
		p50: percentile(&sorted, 0.50),
		p75: percentile(&sorted, 0.75),
		p95: percentile(&sorted, 0.95),
	}
}

/// Interpret a metadata value as epoch seconds.
///
/// Numbers are taken as-is. Strings may hold a four-digit year (January 1st),
/// a number, an RFC 3339 instant, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`
/// or `YYYY-MM-DD` (naive forms are read as UTC).
pub fn parse_timestamp(value: &Value) -> Option<f64> {
	let ts = match value {
		Value::Number(n) => n.as_f64()?,
		Value::String(s) => {
			let s = s.trim();
			if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
				let year: i32 = s.parse().ok()?;
				let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
				date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64
			} else if let Ok(n) = s.parse::<f64>() {
				n
			} else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
				dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9
			} else if let Some(dt) = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
				.iter()
				.find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
			{
				dt.and_utc().timestamp() as f64
			} else {
				let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
				date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64
			}
		}
		_ => return None,
	};
	ts.is_finite().then_some(ts)
}

/// Flag records that cannot take part in scoring: missing id, vector length
/// different from `dim`, or an id already used by an earlier record.
fn scan_anomalies(records: &[Record], dim: Option<usize>) -> Vec<Anomaly> {
	let mut anomalies = Vec::new();
	let mut seen: HashSet<&str> = HashSet::new();

	for (index, record) in records.iter().enumerate() {
		if record.id.is_empty() {
			anomalies.push(Anomaly {
				index,
				id: String::new(),
				kind: AnomalyKind::MissingId,
				detail: "record has no id".into(),
			});
		} else if !seen.insert(record.id.as_str()) {
			anomalies.push(Anomaly {
				index,
				id: record.id.clone(),
				kind: AnomalyKind::DuplicateId,
				detail: "id already used by an earlier record".into(),
			});
		}

		if let Some(dim) = dim {
			if record.vector.len() != dim {
				anomalies.push(Anomaly {
					index,
					id: record.id.clone(),
					kind: AnomalyKind::DimensionMismatch,
					detail: format!("expected {} dimensions, found {}", dim, record.vector.len()),
				});
			}
		}
	}

	for anomaly in &anomalies {
		tracing::warn!(
			index = anomaly.index,
			id = %anomaly.id,
			kind = ?anomaly.kind,
			"{}",
			anomaly.detail
		);
	}
	anomalies
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Build the profile report of `records`.
///
/// The duplicate summary is left empty; the pipeline fills it in once
/// duplicate detection has run.
pub fn profile_collection(
	records: &[Record],
	config: &CurationConfig,
	cancel: &CancellationFlag,
) -> Result<ProfileReport, CuratorError> {
	let dim = records.first().map(|r| r.vector.len());
	let anomalies = scan_anomalies(records, dim);

	let mut flagged = vec![false; records.len()];
	for anomaly in &anomalies {
		flagged[anomaly.index] = true;
	}

	let recency_field = config.recency_field.as_deref();
	let mut stats = PartitionStats::default();
	let chunk = config.partition_size.max(1);

	for (p, partition) in records.chunks(chunk).enumerate() {
		cancel.check()?;
		let offset = p * chunk;
		let mut part = PartitionStats::default();
		for (i, record) in partition.iter().enumerate() {
			part.observe(record, dim, flagged[offset + i], recency_field);
		}
		stats.merge(part);
	}

	let total = stats.records;
	let field_coverage = stats
		.field_counts
		.iter()
		.map(|(name, &count)| {
			(
				name.clone(),
				FieldCoverage {
					count,
					ratio: count as f64 / total as f64,
				},
			)
		})
		.collect();

	let top_terms = stats
		.terms
		.top(config.top_terms)
		.into_iter()
		.map(|(term, count)| TermCount { term, count })
		.collect();

	let top_values = stats
		.values
		.iter()
		.map(|(name, counter)| {
			let top = counter
				.top(config.top_values)
				.into_iter()
				.map(|(value, count)| ValueCount { value, count })
				.collect();
			(name.clone(), top)
		})
		.collect();

	let mut id_counts = OrderedCounter::default();
	for record in records.iter().filter(|r| !r.id.is_empty()) {
		id_counts.add(&record.id, 1);
	}
	let duplicate_ids = id_counts
		.entries
		.iter()
		.filter(|(_, n)| *n > 1)
		.map(|(id, _)| id.clone())
		.collect();

	let recency = recency_field.and_then(|field| {
		let min = stats.timestamps.iter().copied().reduce(f64::min)?;
		let max = stats.timestamps.iter().copied().reduce(f64::max)?;
		Some(RecencyRange {
			field: field.to_string(),
			parsed: stats.timestamps.len(),
			min,
			max,
		})
	});

	let has_document_ratio = if total == 0 {
		0.0
	} else {
		stats.doc_lengths.len() as f64 / total as f64
	};

	let report = ProfileReport {
		num_records: total,
		embedding_dim: dim,
		field_coverage,
		has_document_ratio,
		doc_length_stats: distribution(&stats.doc_lengths),
		embedding_norm_stats: distribution(&stats.norms),
		top_terms,
		top_values,
		unique_ids: id_counts.entries.len(),
		duplicate_ids,
		recency,
		duplicates: DuplicateSummary::default(),
		anomalies,
		richness_cap: Some(distribution(&stats.eligible_doc_lengths).p95).filter(|cap| *cap > 0.0),
	};

	tracing::info!(
		records = report.num_records,
		fields = report.field_coverage.len(),
		anomalies = report.anomalies.len(),
		"Profiled collection"
	);
	Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
