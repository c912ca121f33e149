// ---------------------------------------------------------------------------
// Pipeline — Profile → Detect duplicates → Score → Select
// ---------------------------------------------------------------------------
//
// Each stage consumes the finished artifacts of the previous one. A run
// holds no state beyond its return value, so identical input and
// configuration give identical output.
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::CurationConfig;
use crate::deduplication::detect_duplicates;
use crate::error::CuratorError;
use crate::profiler::profile_collection;
use crate::scoring::score_records;
use crate::selector::select;
use crate::types::{DuplicateMap, ProfileReport, Record, SelectionResult};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag polled between partitions and buckets. Clones observe the
/// same flag.
///
/// Nothing inside the crate raises it: the CLI and the JSON-RPC server run
/// each job to completion. It is for library callers that run a job on one
/// thread and stop it from another.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	/// `Err(Cancelled)` once the flag has been raised.
	pub fn check(&self) -> Result<(), CuratorError> {
		if self.is_cancelled() {
			Err(CuratorError::Cancelled)
		} else {
			Ok(())
		}
	}
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileOutcome {
	pub profile: ProfileReport,
	pub duplicates: DuplicateMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurationOutcome {
	pub profile: ProfileReport,
	pub duplicates: DuplicateMap,
	pub selection: SelectionResult,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Profile the collection and detect duplicates among well-formed records.
/// The report's duplicate summary reflects the detected groups.
pub fn run_profile(
	records: &[Record],
	config: &CurationConfig,
	cancel: &CancellationFlag,
) -> Result<ProfileOutcome, CuratorError> {
	config.validate()?;

	let mut profile = profile_collection(records, config, cancel)?;
	let eligible = eligible_indices(records.len(), &profile);
	let duplicates = detect_duplicates(records, &eligible, config, cancel)?;
	profile.duplicates = duplicates.summary();

	Ok(ProfileOutcome {
		profile,
		duplicates,
	})
}

/// Full run: profile, detect duplicates, score and select.
pub fn run_curation(
	records: &[Record],
	config: &CurationConfig,
	cancel: &CancellationFlag,
) -> Result<CurationOutcome, CuratorError> {
	let ProfileOutcome {
		profile,
		duplicates,
	} = run_profile(records, config, cancel)?;

	let eligible = eligible_indices(records.len(), &profile);
	cancel.check()?;
	let scored = score_records(records, &eligible, &profile, &duplicates, config);
	let selection = select(scored, config);

	Ok(CurationOutcome {
		profile,
		duplicates,
		selection,
	})
}

/// Indices of records that carry no anomaly, in input order.
fn eligible_indices(len: usize, profile: &ProfileReport) -> Vec<usize> {
	let anomalous = profile.anomalous_indices();
	(0..len)
		.filter(|i| anomalous.binary_search(i).is_err())
		.collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{DedupMode, ScoreWeights};
	use serde_json::{json, Value};
	use std::collections::BTreeMap;

	fn make_record(id: &str, vector: Vec<f32>, metadata: Value, document: &str) -> Record {
		let metadata = match metadata {
			Value::Object(map) => map.into_iter().collect(),
			_ => BTreeMap::new(),
		};
		Record {
			id: id.to_string(),
			vector,
			metadata,
			document: Some(document.to_string()),
		}
	}

	/// Five records, dimensionality 3; D and E share a document.
	fn five_records() -> Vec<Record> {
		vec![
			make_record(
				"A",
				vec![1.0, 0.0, 0.0],
				json!({"title": "Kernel bug", "source": "nvd", "published": "2024-03-01"}),
				"Use-after-free in the kernel scheduler allows privilege escalation.",
			),
			make_record(
				"B",
				vec![0.0, 1.0, 0.0],
				json!({"title": "Parser bug", "published": "2023-06-15"}),
				"Heap overflow in image parser.",
			),
			make_record(
				"C",
				vec![0.0, 0.0, 1.0],
				json!({"source": "osv"}),
				"Short note.",
			),
			make_record(
				"D",
				vec![0.6, 0.8, 0.0],
				json!({"title": "TLS issue", "source": "nvd", "published": "2024-01-10"}),
				"Certificate validation bypass in TLS client.",
			),
			make_record(
				"E",
				vec![0.0, 0.6, 0.8],
				json!({"title": "TLS issue"}),
				"certificate  validation bypass in TLS client. ",
			),
		]
	}

	fn config(top_n: usize) -> CurationConfig {
		CurationConfig {
			top_n,
			key_fields: vec!["title".into(), "source".into(), "published".into()],
			..Default::default()
		}
	}

	#[test]
	fn duplicate_documents_yield_one_representative() {
		let records = five_records();
		let outcome = run_curation(&records, &config(4), &CancellationFlag::new()).unwrap();

		assert_eq!(outcome.duplicates.groups.len(), 1);
		assert_eq!(outcome.duplicates.groups[0].members, vec!["D", "E"]);
		assert_eq!(outcome.profile.duplicates.groups, 1);
		assert_eq!(outcome.profile.duplicates.records, 2);

		let ids: Vec<&str> = outcome.selection.iter().map(|s| s.id.as_str()).collect();
		assert_eq!(ids.len(), 4);
		assert!(ids.contains(&"A") && ids.contains(&"B") && ids.contains(&"C"));
		assert!(ids.contains(&"D"));
		assert!(!ids.contains(&"E"));

		let scored = CurationConfig {
			include_score: true,
			..config(4)
		};
		let outcome = run_curation(&records, &scored, &CancellationFlag::new()).unwrap();
		let scores: Vec<f64> = outcome.selection.iter().map(|s| s.score.unwrap()).collect();
		assert!(scores.windows(2).all(|w| w[0] >= w[1]));
	}

	#[test]
	fn empty_collection_is_not_an_error() {
		for top_n in [1, 10, 5000] {
			let outcome = run_curation(&[], &config(top_n), &CancellationFlag::new()).unwrap();
			assert_eq!(outcome.profile.num_records, 0);
			assert!(!outcome.profile.doc_length_stats.defined);
			assert_eq!(outcome.profile.duplicates.groups, 0);
			assert!(outcome.selection.is_empty());
		}
	}

	#[test]
	fn recency_field_missing_everywhere_matches_no_recency() {
		let records: Vec<Record> = five_records()
			.into_iter()
			.map(|mut r| {
				r.metadata.remove("published");
				r
			})
			.collect();
		let unset = CurationConfig {
			include_score: true,
			..config(5)
		};
		let set = CurationConfig {
			recency_field: Some("published".into()),
			..unset.clone()
		};
		let a = run_curation(&records, &unset, &CancellationFlag::new()).unwrap();
		let b = run_curation(&records, &set, &CancellationFlag::new()).unwrap();
		assert_eq!(a.selection, b.selection);
	}

	#[test]
	fn recency_changes_ranking_when_present() {
		let records = five_records();
		let cfg = CurationConfig {
			recency_field: Some("published".into()),
			score_weights: ScoreWeights {
				completeness: 0.0,
				richness: 0.0,
				recency: 1.0,
				duplicate_penalty: 0.5,
			},
			include_score: true,
			..config(2)
		};
		let outcome = run_curation(&records, &cfg, &CancellationFlag::new()).unwrap();
		assert_eq!(outcome.selection[0].id, "A");
		assert_eq!(outcome.selection[0].score, Some(1.0));
		assert_eq!(outcome.selection[1].id, "D");
	}

	#[test]
	fn runs_are_idempotent() {
		let records = five_records();
		let cfg = config(3);
		let first = run_curation(&records, &cfg, &CancellationFlag::new()).unwrap();
		let second = run_curation(&records, &cfg, &CancellationFlag::new()).unwrap();
		assert_eq!(
			serde_json::to_string(&first).unwrap(),
			serde_json::to_string(&second).unwrap()
		);
	}

	#[test]
	fn anomalous_records_are_excluded_from_selection() {
		let mut records = five_records();
		records.push(make_record("F", vec![1.0, 0.0], json!({}), "wrong dimension"));
		records.push(make_record("", vec![0.0, 1.0, 1.0], json!({}), "no id"));
		let outcome = run_curation(&records, &config(10), &CancellationFlag::new()).unwrap();
		assert_eq!(outcome.profile.num_records, 7);
		assert_eq!(outcome.profile.anomalies.len(), 2);
		assert_eq!(outcome.selection.len(), 4);
		assert!(outcome.selection.iter().all(|s| s.id != "F" && !s.id.is_empty()));
	}

	#[test]
	fn invalid_config_fails_before_processing() {
		let cancel = CancellationFlag::new();
		let err = run_curation(&five_records(), &config(0), &cancel).unwrap_err();
		assert!(matches!(err, CuratorError::InvalidConfig { option: "top_n", .. }));
	}

	#[test]
	fn bucketed_mode_selects_the_same_records() {
		let records = five_records();
		let bucketed = CurationConfig {
			dedup_mode: DedupMode::Bucketed,
			..config(4)
		};
		let a = run_curation(&records, &config(4), &CancellationFlag::new()).unwrap();
		let b = run_curation(&records, &bucketed, &CancellationFlag::new()).unwrap();
		assert_eq!(a.selection, b.selection);
		assert_eq!(a.duplicates, b.duplicates);
	}

	#[test]
	fn cancellation_flag_is_shared_between_clones() {
		let flag = CancellationFlag::new();
		let clone = flag.clone();
		assert!(clone.check().is_ok());
		flag.cancel();
		assert!(clone.is_cancelled());
		let err = run_profile(&five_records(), &config(1), &clone).unwrap_err();
		assert!(matches!(err, CuratorError::Cancelled));
	}

	#[test]
	fn cancellation_from_another_thread_stops_curation() {
		let flag = CancellationFlag::new();
		let remote = flag.clone();
		std::thread::spawn(move || remote.cancel()).join().unwrap();

		let err = run_curation(&five_records(), &config(2), &flag).unwrap_err();
		assert!(matches!(err, CuratorError::Cancelled));
	}
}
