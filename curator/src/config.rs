use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::CuratorError;

pub const DEFAULT_KEY_FIELDS: [&str; 6] =
	["title", "summary", "cve_id", "published", "source", "severity"];

// ---------------------------------------------------------------------------
// Curation configuration
// ---------------------------------------------------------------------------

/// How near-duplicate vectors are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
	/// Exact all-pairs comparison, refused above `max_pairwise_records`.
	#[default]
	Pairwise,
	/// Slab bucketing on the highest-variance axis before exact comparison.
	Bucketed,
}

/// How exported vectors are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VectorEncoding {
	#[default]
	Float,
	/// Base64 of little-endian f32 bytes.
	Base64,
}

/// Weights of the richness score terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreWeights {
	pub completeness: f64,
	pub richness: f64,
	pub recency: f64,
	/// Fraction of the score removed from non-representative duplicates.
	pub duplicate_penalty: f64,
}

impl Default for ScoreWeights {
	fn default() -> Self {
		Self {
			completeness: 0.4,
			richness: 0.4,
			recency: 0.2,
			duplicate_penalty: 0.5,
		}
	}
}

impl ScoreWeights {
	fn validate(&self) -> Result<(), CuratorError> {
		for (option, value) in [
			("score_weights.completeness", self.completeness),
			("score_weights.richness", self.richness),
			("score_weights.recency", self.recency),
		] {
			if !value.is_finite() || value < 0.0 {
				return Err(CuratorError::invalid_config(
					option,
					value,
					"must be a finite, non-negative number",
				));
			}
		}
		if !(0.0..=1.0).contains(&self.duplicate_penalty) {
			return Err(CuratorError::invalid_config(
				"score_weights.duplicate_penalty",
				self.duplicate_penalty,
				"must be within [0, 1]",
			));
		}
		let total = self.completeness + self.richness + self.recency;
		if total <= 0.0 {
			return Err(CuratorError::invalid_config(
				"score_weights",
				total,
				"completeness + richness + recency must be positive",
			));
		}
		Ok(())
	}
}

/// Typed configuration for one profiling/export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurationConfig {
	pub top_n: usize,
	pub key_fields: Vec<String>,
	pub duplicate_threshold: f64,
	pub recency_field: Option<String>,
	pub score_weights: ScoreWeights,
	pub allow_duplicates: bool,
	pub require_document: bool,
	pub dedup_mode: DedupMode,
	pub max_pairwise_records: usize,
	pub top_terms: usize,
	pub top_values: usize,
	pub partition_size: usize,
	pub include_vector: bool,
	pub include_document: bool,
	pub include_score: bool,
	pub vector_encoding: VectorEncoding,
}

impl Default for CurationConfig {
	fn default() -> Self {
		Self {
			top_n: 2048,
			key_fields: DEFAULT_KEY_FIELDS.iter().map(|s| s.to_string()).collect(),
			duplicate_threshold: 0.98,
			recency_field: None,
			score_weights: ScoreWeights::default(),
			allow_duplicates: false,
			require_document: false,
			dedup_mode: DedupMode::Pairwise,
			max_pairwise_records: 20_000,
			top_terms: 20,
			top_values: 5,
			partition_size: 4096,
			include_vector: true,
			include_document: true,
			include_score: false,
			vector_encoding: VectorEncoding::Float,
		}
	}
}

impl CurationConfig {
	/// Reject invalid options before any record is read.
	pub fn validate(&self) -> Result<(), CuratorError> {
		if self.top_n == 0 {
			return Err(CuratorError::invalid_config(
				"top_n",
				self.top_n,
				"must be at least 1",
			));
		}
		if !self.duplicate_threshold.is_finite() || !(0.0..=1.0).contains(&self.duplicate_threshold)
		{
			return Err(CuratorError::invalid_config(
				"duplicate_threshold",
				self.duplicate_threshold,
				"must be within [0, 1]",
			));
		}
		for (i, field) in self.key_fields.iter().enumerate() {
			if field.trim().is_empty() {
				return Err(CuratorError::invalid_config(
					"key_fields",
					format!("{:?}", self.key_fields),
					"field names must be non-empty",
				));
			}
			if self.key_fields[..i].contains(field) {
				return Err(CuratorError::invalid_config(
					"key_fields",
					field,
					"field listed more than once",
				));
			}
		}
		if let Some(field) = &self.recency_field {
			if field.trim().is_empty() {
				return Err(CuratorError::invalid_config(
					"recency_field",
					format!("{:?}", field),
					"must be a non-empty field name",
				));
			}
		}
		self.score_weights.validate()?;
		if self.max_pairwise_records == 0 {
			return Err(CuratorError::invalid_config(
				"max_pairwise_records",
				self.max_pairwise_records,
				"must be at least 1",
			));
		}
		if self.partition_size == 0 {
			return Err(CuratorError::invalid_config(
				"partition_size",
				self.partition_size,
				"must be at least 1",
			));
		}
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
	name = "curator-engine",
	version,
	about = "Profile a vector collection and export a curated, edge-ready subset"
)]
pub struct CliArgs {
	/// Log level (trace, debug, info, warn, error)
	#[arg(long, global = true, default_value = "info", env = "CURATOR_LOG_LEVEL")]
	pub log_level: String,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Compute the profile report of a collection
	Profile {
		/// Record file (JSON array, NDJSON or columnar dump; optionally gzipped)
		#[arg(long)]
		input: PathBuf,

		/// Report destination (stdout when omitted; `.gz` compresses)
		#[arg(long)]
		output: Option<PathBuf>,

		#[command(flatten)]
		curation: CurationArgs,
	},

	/// Profile, score and export the top-N records
	Curate {
		#[arg(long)]
		input: PathBuf,

		/// Selection destination
		#[arg(long, default_value = "export_for_edge.json")]
		output: PathBuf,

		/// Profile report destination
		#[arg(long, default_value = "collection_profile.json")]
		profile_output: PathBuf,

		/// Optional duplicate group listing
		#[arg(long)]
		duplicates_output: Option<PathBuf>,

		#[command(flatten)]
		curation: CurationArgs,
	},

	/// List the records most similar to a query
	Search {
		#[arg(long)]
		input: PathBuf,

		/// Use the vector of this record as the query
		#[arg(long, conflicts_with = "vector", required_unless_present = "vector")]
		id: Option<String>,

		/// Comma-separated query vector
		#[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
		vector: Option<Vec<f32>>,

		#[arg(long, default_value = "5")]
		top_k: usize,
	},

	/// Draw a small fixture file from an exported selection
	Sample {
		#[arg(long, default_value = "export_for_edge.json")]
		input: PathBuf,

		#[arg(long, default_value = "tests/test_vectors.json")]
		output: PathBuf,

		#[arg(long, default_value = "20")]
		size: usize,

		/// Seed for a reproducible draw
		#[arg(long, env = "CURATOR_SAMPLE_SEED")]
		seed: Option<u64>,
	},

	/// Serve JSON-RPC 2.0 over NDJSON stdio
	Serve,
}

/// Curation options shared by `profile` and `curate`.
#[derive(Args, Debug, Clone)]
pub struct CurationArgs {
	/// Number of records to export
	#[arg(long, default_value = "2048", env = "CURATOR_TOP_N")]
	pub top_n: usize,

	/// Metadata fields scored for completeness and kept in the export
	#[arg(
		long,
		value_delimiter = ',',
		default_values_t = DEFAULT_KEY_FIELDS.map(String::from),
		env = "CURATOR_KEY_FIELDS"
	)]
	pub key_fields: Vec<String>,

	/// Cosine similarity at or above which two vectors are duplicates
	#[arg(long, default_value = "0.98", env = "CURATOR_DUPLICATE_THRESHOLD")]
	pub duplicate_threshold: f64,

	/// Timestamp-like metadata field used for the recency term
	#[arg(long, env = "CURATOR_RECENCY_FIELD")]
	pub recency_field: Option<String>,

	#[arg(long, default_value = "0.4", env = "CURATOR_WEIGHT_COMPLETENESS")]
	pub weight_completeness: f64,

	#[arg(long, default_value = "0.4", env = "CURATOR_WEIGHT_RICHNESS")]
	pub weight_richness: f64,

	#[arg(long, default_value = "0.2", env = "CURATOR_WEIGHT_RECENCY")]
	pub weight_recency: f64,

	/// Fraction of the score removed from non-representative duplicates
	#[arg(long, default_value = "0.5", env = "CURATOR_WEIGHT_DUPLICATE_PENALTY")]
	pub weight_duplicate_penalty: f64,

	/// Let several members of one duplicate group be selected
	#[arg(long, env = "CURATOR_ALLOW_DUPLICATES")]
	pub allow_duplicates: bool,

	/// Only export records that carry a document
	#[arg(long, env = "CURATOR_REQUIRE_DOCUMENT")]
	pub require_document: bool,

	#[arg(long, value_enum, default_value_t = DedupMode::Pairwise, env = "CURATOR_DEDUP_MODE")]
	pub dedup_mode: DedupMode,

	/// Largest collection accepted by pairwise duplicate detection
	#[arg(long, default_value = "20000", env = "CURATOR_MAX_PAIRWISE_RECORDS")]
	pub max_pairwise_records: usize,

	#[arg(long, default_value = "20")]
	pub top_terms: usize,

	#[arg(long, default_value = "5")]
	pub top_values: usize,

	/// Records per profiling partition
	#[arg(long, default_value = "4096")]
	pub partition_size: usize,

	/// Leave vectors out of the export
	#[arg(long)]
	pub no_vector: bool,

	/// Leave documents out of the export
	#[arg(long)]
	pub no_document: bool,

	/// Write each record's score into the export
	#[arg(long)]
	pub include_score: bool,

	#[arg(long, value_enum, default_value_t = VectorEncoding::Float)]
	pub vector_encoding: VectorEncoding,
}

impl From<CurationArgs> for CurationConfig {
	fn from(args: CurationArgs) -> Self {
		Self {
			top_n: args.top_n,
			key_fields: args.key_fields,
			duplicate_threshold: args.duplicate_threshold,
			recency_field: args.recency_field,
			score_weights: ScoreWeights {
				completeness: args.weight_completeness,
				richness: args.weight_richness,
				recency: args.weight_recency,
				duplicate_penalty: args.weight_duplicate_penalty,
			},
			allow_duplicates: args.allow_duplicates,
			require_document: args.require_document,
			dedup_mode: args.dedup_mode,
			max_pairwise_records: args.max_pairwise_records,
			top_terms: args.top_terms,
			top_values: args.top_values,
			partition_size: args.partition_size,
			include_vector: !args.no_vector,
			include_document: !args.no_document,
			include_score: args.include_score,
			vector_encoding: args.vector_encoding,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn option_of(err: CuratorError) -> &'static str {
		match err {
			CuratorError::InvalidConfig { option, .. } => option,
			other => panic!("expected InvalidConfig, got {other:?}"),
		}
	}

	#[test]
	fn defaults_are_valid() {
		CurationConfig::default().validate().unwrap();
	}

	#[test]
	fn zero_top_n_rejected() {
		let cfg = CurationConfig {
			top_n: 0,
			..Default::default()
		};
		assert_eq!(option_of(cfg.validate().unwrap_err()), "top_n");
	}

	#[test]
	fn threshold_outside_unit_interval_rejected() {
		for t in [-0.1, 1.5, f64::NAN] {
			let cfg = CurationConfig {
				duplicate_threshold: t,
				..Default::default()
			};
			assert_eq!(option_of(cfg.validate().unwrap_err()), "duplicate_threshold");
		}
	}

	#[test]
	fn zero_weight_total_rejected() {
		let cfg = CurationConfig {
			score_weights: ScoreWeights {
				completeness: 0.0,
				richness: 0.0,
				recency: 0.0,
				duplicate_penalty: 0.5,
			},
			..Default::default()
		};
		assert_eq!(option_of(cfg.validate().unwrap_err()), "score_weights");
	}

	#[test]
	fn negative_weight_rejected() {
		let mut cfg = CurationConfig::default();
		cfg.score_weights.richness = -1.0;
		assert_eq!(
			option_of(cfg.validate().unwrap_err()),
			"score_weights.richness"
		);
	}

	#[test]
	fn penalty_above_one_rejected() {
		let mut cfg = CurationConfig::default();
		cfg.score_weights.duplicate_penalty = 1.5;
		assert_eq!(
			option_of(cfg.validate().unwrap_err()),
			"score_weights.duplicate_penalty"
		);
	}

	#[test]
	fn repeated_key_field_rejected() {
		let cfg = CurationConfig {
			key_fields: vec!["title".into(), "title".into()],
			..Default::default()
		};
		assert_eq!(option_of(cfg.validate().unwrap_err()), "key_fields");
	}

	#[test]
	fn blank_recency_field_rejected() {
		let cfg = CurationConfig {
			recency_field: Some(" ".into()),
			..Default::default()
		};
		assert_eq!(option_of(cfg.validate().unwrap_err()), "recency_field");
	}

	#[test]
	fn partial_json_config_fills_defaults() {
		let cfg: CurationConfig =
			serde_json::from_str(r#"{"topN": 4, "scoreWeights": {"recency": 0.0}}"#).unwrap();
		assert_eq!(cfg.top_n, 4);
		assert_eq!(cfg.score_weights.recency, 0.0);
		assert_eq!(cfg.score_weights.completeness, 0.4);
		assert_eq!(cfg.duplicate_threshold, 0.98);
	}

	#[test]
	fn cli_args_convert_into_config() {
		let args = CliArgs::parse_from([
			"curator-engine",
			"curate",
			"--input",
			"records.json",
			"--top-n",
			"10",
			"--key-fields",
			"title,source",
			"--no-vector",
			"--dedup-mode",
			"bucketed",
		]);
		let Command::Curate { curation, .. } = args.command else {
			panic!("expected curate subcommand");
		};
		let cfg = CurationConfig::from(curation);
		assert_eq!(cfg.top_n, 10);
		assert_eq!(cfg.key_fields, vec!["title", "source"]);
		assert!(!cfg.include_vector);
		assert_eq!(cfg.dedup_mode, DedupMode::Bucketed);
	}
}
