// ---------------------------------------------------------------------------
// CuratorServer — JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Routes JSON-RPC 2.0 requests (NDJSON over stdin) to the curation pipeline.
// Every request carries its own records, so the server keeps no collection
// state between calls.
// ---------------------------------------------------------------------------

use std::io::{self, BufRead, Write};

use serde::Deserialize;
use serde_json::Value;

use crate::config::CurationConfig;
use crate::error::CuratorError;
use crate::pipeline::{run_curation, run_profile, CancellationFlag};
use crate::protocol::*;
use crate::sampling::sample_records;
use crate::search::{top_similar, top_similar_to_id};
use crate::source::records_from_value;
use crate::transport::NdjsonTransport;

const DEFAULT_TOP_K: usize = 5;

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

enum HandlerError {
	Params(String),
	Curator(CuratorError),
}

impl From<CuratorError> for HandlerError {
	fn from(e: CuratorError) -> Self {
		Self::Curator(e)
	}
}

type HandlerResult = Result<Value, HandlerError>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// JSON-RPC server exposing profiling, curation, search and sampling.
pub struct CuratorServer<W: Write = io::Stdout> {
	transport: NdjsonTransport<W>,
	cancel: CancellationFlag,
}

impl<W: Write> CuratorServer<W> {
	pub fn new(transport: NdjsonTransport<W>) -> Self {
		Self::with_cancellation(transport, CancellationFlag::new())
	}

	/// Server whose profile and curate jobs poll `cancel`. Raising it from
	/// another thread aborts the running job and every later one.
	pub fn with_cancellation(transport: NdjsonTransport<W>, cancel: CancellationFlag) -> Self {
		Self { transport, cancel }
	}

	pub fn into_transport(self) -> NdjsonTransport<W> {
		self.transport
	}

	/// Main loop: read JSON-RPC messages from stdin, dispatch to handlers.
	pub fn run(&mut self) -> Result<(), CuratorError> {
		let stdin = io::stdin();
		self.serve(stdin.lock())
	}

	/// Serve requests from `reader` until EOF.
	pub fn serve<R: BufRead>(&mut self, reader: R) -> Result<(), CuratorError> {
		for line_result in reader.lines() {
			let line = line_result?;
			if line.trim().is_empty() {
				continue;
			}

			let request: JsonRpcRequest = match serde_json::from_str(&line) {
				Ok(r) => r,
				Err(e) => {
					tracing::error!("Failed to parse request: {}", e);
					continue;
				}
			};

			self.dispatch(request);
		}

		Ok(())
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		tracing::debug!(id, method = %req.method, "Dispatching request");

		let result = match req.method.as_str() {
			"curator/profile" => handle_profile(req.params, &self.cancel),
			"curator/curate" => handle_curate(req.params, &self.cancel),
			"curator/search" => handle_search(req.params),
			"curator/sample" => handle_sample(req.params),
			_ => {
				self.transport.write_error(
					id,
					METHOD_NOT_FOUND,
					format!("Unknown method: {}", req.method),
					None,
				);
				return;
			}
		};

		match result {
			Ok(value) => self.transport.write_response(id, value),
			Err(HandlerError::Params(message)) => {
				self.transport.write_error(id, INVALID_PARAMS, message, None)
			}
			Err(HandlerError::Curator(e)) => {
				let code = match e {
					CuratorError::Io(_) | CuratorError::Json(_) => INTERNAL_ERROR,
					_ => CURATOR_ERROR,
				};
				self.transport
					.write_error(id, code, e.to_string(), Some(e.to_json_rpc_error()))
			}
		}
	}
}

// ---------------------------------------------------------------------------
// Param types
// ---------------------------------------------------------------------------

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
	serde_json::from_value(params).map_err(|e| HandlerError::Params(format!("Invalid params: {}", e)))
}

#[derive(Deserialize)]
struct CurationParams {
	records: Value,
	#[serde(default)]
	config: CurationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
	records: Value,
	query: Option<Vec<f32>>,
	query_id: Option<String>,
	top_k: Option<usize>,
}

#[derive(Deserialize)]
struct SampleParams {
	records: Vec<Value>,
	size: usize,
	seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_profile(params: Value, cancel: &CancellationFlag) -> HandlerResult {
	let p: CurationParams = parse_params(params)?;
	let records = records_from_value(p.records)?;
	let outcome = run_profile(&records, &p.config, cancel)?;
	Ok(serde_json::to_value(outcome.profile).map_err(CuratorError::from)?)
}

fn handle_curate(params: Value, cancel: &CancellationFlag) -> HandlerResult {
	let p: CurationParams = parse_params(params)?;
	let records = records_from_value(p.records)?;
	let outcome = run_curation(&records, &p.config, cancel)?;
	Ok(serde_json::to_value(outcome).map_err(CuratorError::from)?)
}

fn handle_search(params: Value) -> HandlerResult {
	let p: SearchParams = parse_params(params)?;
	let records = records_from_value(p.records)?;
	let top_k = p.top_k.unwrap_or(DEFAULT_TOP_K);

	let matches = match (p.query, p.query_id) {
		(Some(query), None) => top_similar(&query, &records, top_k),
		(None, Some(id)) => top_similar_to_id(&id, &records, top_k)?,
		_ => {
			return Err(HandlerError::Params(
				"Invalid params: exactly one of 'query' or 'queryId' is required".into(),
			));
		}
	};
	Ok(serde_json::json!({ "matches": matches }))
}

fn handle_sample(params: Value) -> HandlerResult {
	let p: SampleParams = parse_params(params)?;
	let sample = sample_records(p.records, p.size, p.seed)?;
	Ok(serde_json::json!({ "records": sample }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
