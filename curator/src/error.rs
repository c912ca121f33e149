use thiserror::Error;

#[derive(Debug, Error)]
pub enum CuratorError {
	#[error("Invalid configuration: {option} = {value} ({reason})")]
	InvalidConfig {
		option: &'static str,
		value: String,
		reason: &'static str,
	},
	#[error(
		"Collection too large for pairwise duplicate detection: {records} records exceeds limit of {limit}; enable bucketed mode"
	)]
	ResourceExhausted { records: usize, limit: usize },
	#[error("Curation run cancelled")]
	Cancelled,
	#[error("Not enough records: requested {requested}, available {available}")]
	NotEnoughRecords { requested: usize, available: usize },
	#[error("Record not found: {0}")]
	RecordNotFound(String),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Corrupt data: {0}")]
	Corruption(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl CuratorError {
	pub(crate) fn invalid_config(
		option: &'static str,
		value: impl ToString,
		reason: &'static str,
	) -> Self {
		Self::InvalidConfig {
			option,
			value: value.to_string(),
			reason,
		}
	}

	pub fn code(&self) -> &str {
		match self {
			Self::InvalidConfig { .. } => "CURATOR_INVALID_CONFIG",
			Self::ResourceExhausted { .. } => "CURATOR_RESOURCE_EXHAUSTED",
			Self::Cancelled => "CURATOR_CANCELLED",
			Self::NotEnoughRecords { .. } => "CURATOR_NOT_ENOUGH_RECORDS",
			Self::RecordNotFound(_) => "CURATOR_RECORD_NOT_FOUND",
			Self::InvalidInput(_) => "CURATOR_INVALID_INPUT",
			Self::Corruption(_) => "CURATOR_CORRUPT",
			Self::Io(_) => "CURATOR_IO",
			Self::Json(_) => "CURATOR_JSON",
		}
	}

	pub fn to_json_rpc_error(&self) -> serde_json::Value {
		serde_json::json!({
			"curatorCode": self.code(),
			"message": self.to_string(),
		})
	}
}
