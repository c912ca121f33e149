// ---------------------------------------------------------------------------
// Record source — load a finite record set from disk or JSON
// ---------------------------------------------------------------------------
//
// Accepted layouts:
//   - JSON array of record objects
//   - NDJSON, one record object per line
//   - columnar dump `{ "ids", "embeddings", "metadatas", "documents" }`
// Any of them may be gzip-compressed. Embeddings are either float arrays
// or base64 strings of little-endian f32 bytes (`vector_b64`).
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CuratorError;
use crate::types::Record;

// ---------------------------------------------------------------------------
// Embedding codec
// ---------------------------------------------------------------------------

/// Base64 of the vector's little-endian f32 bytes.
pub fn encode_vector(vector: &[f32]) -> String {
	let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
	STANDARD.encode(bytes)
}

/// Inverse of [`encode_vector`].
pub fn decode_vector(encoded: &str) -> Result<Vec<f32>, CuratorError> {
	let bytes = STANDARD
		.decode(encoded.trim())
		.map_err(|e| CuratorError::Corruption(format!("invalid base64 vector: {e}")))?;
	if bytes.len() % 4 != 0 {
		return Err(CuratorError::Corruption(format!(
			"base64 vector holds {} bytes, not a multiple of 4",
			bytes.len()
		)));
	}
	Ok(bytes
		.chunks_exact(4)
		.map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
		.collect())
}

// ---------------------------------------------------------------------------
// Gzip
// ---------------------------------------------------------------------------

/// Check for the gzip magic bytes (0x1f, 0x8b).
pub fn is_gzipped(data: &[u8]) -> bool {
	data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, CuratorError> {
	let mut out = Vec::new();
	GzDecoder::new(data).read_to_end(&mut out)?;
	Ok(out)
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
	#[serde(default)]
	id: Option<Value>,
	#[serde(default, alias = "embedding")]
	vector: Option<Vec<f32>>,
	#[serde(default)]
	vector_b64: Option<String>,
	#[serde(default, alias = "metadatas")]
	metadata: Option<BTreeMap<String, Value>>,
	#[serde(default, alias = "text")]
	document: Option<String>,
}

/// Column-per-field dump as returned by a vector store's bulk `get`.
#[derive(Debug, Deserialize)]
struct ColumnarDump {
	ids: Vec<Value>,
	#[serde(default)]
	embeddings: Option<Vec<Option<Vec<f32>>>>,
	#[serde(default)]
	metadatas: Option<Vec<Option<BTreeMap<String, Value>>>>,
	#[serde(default)]
	documents: Option<Vec<Option<String>>>,
}

/// Ids may arrive as strings or numbers; anything else counts as missing.
fn id_string(id: Option<Value>) -> String {
	match id {
		Some(Value::String(s)) => s,
		Some(Value::Number(n)) => n.to_string(),
		_ => String::new(),
	}
}

impl RawRecord {
	fn into_record(self) -> Result<Record, CuratorError> {
		let vector = match (self.vector, self.vector_b64) {
			(Some(v), _) => v,
			(None, Some(encoded)) => decode_vector(&encoded)?,
			(None, None) => Vec::new(),
		};
		Ok(Record {
			id: id_string(self.id),
			vector,
			metadata: self.metadata.unwrap_or_default(),
			document: self.document,
		})
	}
}

fn column<T>(
	values: Option<Vec<Option<T>>>,
	name: &str,
	len: usize,
) -> Result<Vec<Option<T>>, CuratorError> {
	match values {
		None => Ok((0..len).map(|_| None).collect()),
		Some(values) if values.len() == len => Ok(values),
		Some(values) => Err(CuratorError::InvalidInput(format!(
			"column '{}' has {} entries, expected {}",
			name,
			values.len(),
			len
		))),
	}
}

impl ColumnarDump {
	fn into_records(self) -> Result<Vec<Record>, CuratorError> {
		let n = self.ids.len();
		let embeddings = column(self.embeddings, "embeddings", n)?;
		let metadatas = column(self.metadatas, "metadatas", n)?;
		let documents = column(self.documents, "documents", n)?;

		Ok(self
			.ids
			.into_iter()
			.zip(embeddings)
			.zip(metadatas)
			.zip(documents)
			.map(|(((id, vector), metadata), document)| Record {
				id: id_string(Some(id)),
				vector: vector.unwrap_or_default(),
				metadata: metadata.unwrap_or_default(),
				document,
			})
			.collect())
	}
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn record_from_value(value: Value, position: usize) -> Result<Record, CuratorError> {
	serde_json::from_value::<RawRecord>(value)
		.map_err(|e| CuratorError::InvalidInput(format!("record {position}: {e}")))?
		.into_record()
}

/// Interpret an already-parsed JSON document as a record set.
pub fn records_from_value(value: Value) -> Result<Vec<Record>, CuratorError> {
	match value {
		Value::Array(items) => items
			.into_iter()
			.enumerate()
			.map(|(i, v)| record_from_value(v, i))
			.collect(),
		Value::Object(map) if map.contains_key("ids") => {
			let dump: ColumnarDump = serde_json::from_value(Value::Object(map))
				.map_err(|e| CuratorError::InvalidInput(format!("columnar dump: {e}")))?;
			dump.into_records()
		}
		Value::Object(map) => Ok(vec![record_from_value(Value::Object(map), 0)?]),
		other => Err(CuratorError::InvalidInput(format!(
			"expected an array or object of records, found {}",
			match other {
				Value::Null => "null",
				Value::Bool(_) => "a boolean",
				Value::Number(_) => "a number",
				_ => "a string",
			}
		))),
	}
}

/// Parse raw file contents, decompressing gzip input first.
pub fn parse_records(data: &[u8]) -> Result<Vec<Record>, CuratorError> {
	let owned;
	let data = if is_gzipped(data) {
		owned = decompress(data)?;
		owned.as_slice()
	} else {
		data
	};
	let text = std::str::from_utf8(data)
		.map_err(|e| CuratorError::InvalidInput(format!("input is not UTF-8: {e}")))?;

	if text.trim().is_empty() {
		return Ok(Vec::new());
	}

	match serde_json::from_str::<Value>(text) {
		Ok(value) => records_from_value(value),
		Err(whole) => {
			// Not a single JSON document; read it as NDJSON.
			let mut records = Vec::new();
			for (n, line) in text.lines().enumerate() {
				if line.trim().is_empty() {
					continue;
				}
				let value: Value = serde_json::from_str(line).map_err(|e| {
					CuratorError::InvalidInput(format!(
						"line {}: {} (whole-document parse: {})",
						n + 1,
						e,
						whole
					))
				})?;
				records.push(record_from_value(value, records.len())?);
			}
			Ok(records)
		}
	}
}

/// Read every record from `path`.
pub fn load_records(path: &Path) -> Result<Vec<Record>, CuratorError> {
	let data = std::fs::read(path)?;
	let records = parse_records(&data)?;
	tracing::info!(path = %path.display(), records = records.len(), "Loaded records");
	Ok(records)
}

/// Read `path` as a single JSON document, decompressing gzip first.
pub fn load_json(path: &Path) -> Result<Value, CuratorError> {
	let data = std::fs::read(path)?;
	let value = if is_gzipped(&data) {
		serde_json::from_slice(&decompress(&data)?)?
	} else {
		serde_json::from_slice(&data)?
	};
	Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use flate2::write::GzEncoder;
	use flate2::Compression;
	use std::io::Write;

	#[test]
	fn vector_codec_round_trips() {
		let v = vec![1.5f32, -0.25, 0.0];
		assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
	}

	#[test]
	fn decode_rejects_truncated_bytes() {
		let encoded = STANDARD.encode([1u8, 2, 3]);
		assert!(matches!(decode_vector(&encoded), Err(CuratorError::Corruption(_))));
		assert!(decode_vector("***").is_err());
	}

	#[test]
	fn parses_json_array_with_aliases() {
		let text = r#"[
			{"id": "a", "embedding": [1, 0], "metadatas": {"title": "x"}, "text": "doc"},
			{"id": 7, "vector": [0, 1]},
			{"vector": [1, 1]}
		]"#;
		let records = parse_records(text.as_bytes()).unwrap();
		assert_eq!(records.len(), 3);
		assert_eq!(records[0].id, "a");
		assert_eq!(records[0].vector, vec![1.0, 0.0]);
		assert_eq!(records[0].metadata["title"], "x");
		assert_eq!(records[0].document.as_deref(), Some("doc"));
		assert_eq!(records[1].id, "7");
		assert!(records[1].metadata.is_empty());
		assert_eq!(records[2].id, "");
	}

	#[test]
	fn parses_ndjson() {
		let text = "{\"id\": \"a\", \"vector\": [1]}\n\n{\"id\": \"b\", \"vector\": [2]}\n";
		let records = parse_records(text.as_bytes()).unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records[1].id, "b");
	}

	#[test]
	fn ndjson_error_names_the_line() {
		let text = "{\"id\": \"a\"}\n{not json}\n";
		let err = parse_records(text.as_bytes()).unwrap_err();
		assert!(err.to_string().contains("line 2"));
	}

	#[test]
	fn parses_columnar_dump() {
		let text = r#"{
			"ids": ["a", "b"],
			"embeddings": [[1, 0], [0, 1]],
			"metadatas": [{"source": "nvd"}, null],
			"documents": ["first", null]
		}"#;
		let records = parse_records(text.as_bytes()).unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].metadata["source"], "nvd");
		assert!(records[1].metadata.is_empty());
		assert_eq!(records[1].document, None);
	}

	#[test]
	fn columnar_length_mismatch_is_rejected() {
		let text = r#"{"ids": ["a", "b"], "documents": ["only one"]}"#;
		let err = parse_records(text.as_bytes()).unwrap_err();
		assert!(err.to_string().contains("documents"));
	}

	#[test]
	fn base64_vectors_are_decoded() {
		let text = format!(
			r#"[{{"id": "a", "vector_b64": "{}"}}]"#,
			encode_vector(&[0.5, 2.0])
		);
		let records = parse_records(text.as_bytes()).unwrap();
		assert_eq!(records[0].vector, vec![0.5, 2.0]);
	}

	#[test]
	fn gzipped_input_is_decompressed() {
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder
			.write_all(br#"[{"id": "a", "vector": [1, 2]}]"#)
			.unwrap();
		let compressed = encoder.finish().unwrap();
		assert!(is_gzipped(&compressed));
		let records = parse_records(&compressed).unwrap();
		assert_eq!(records[0].vector, vec![1.0, 2.0]);
	}

	#[test]
	fn empty_input_yields_no_records() {
		assert!(parse_records(b"  \n").unwrap().is_empty());
		assert!(parse_records(b"[]").unwrap().is_empty());
	}

	#[test]
	fn scalar_document_is_rejected() {
		assert!(parse_records(b"42").is_err());
	}
}
