// ---------------------------------------------------------------------------
// Export sink — pretty JSON files, optionally gzip-compressed
// ---------------------------------------------------------------------------

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::error::CuratorError;

/// Serialize `value` as pretty JSON followed by a newline.
pub fn to_pretty_bytes(value: &impl Serialize) -> Result<Vec<u8>, CuratorError> {
	let mut bytes = serde_json::to_vec_pretty(value)?;
	bytes.push(b'\n');
	Ok(bytes)
}

fn is_gzip_path(path: &Path) -> bool {
	path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Write `value` to `path`, gzip-compressing when the name ends in `.gz`.
/// Parent directories are created as needed.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<(), CuratorError> {
	let bytes = to_pretty_bytes(value)?;
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}

	let file = BufWriter::new(File::create(path)?);
	if is_gzip_path(path) {
		let mut encoder = GzEncoder::new(file, Compression::new(6));
		encoder.write_all(&bytes)?;
		encoder.finish()?.flush()?;
	} else {
		let mut file = file;
		file.write_all(&bytes)?;
		file.flush()?;
	}

	tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote export");
	Ok(())
}

/// Write `value` to `path`, or to stdout when no path is given.
pub fn write_json_or_stdout(path: Option<&Path>, value: &impl Serialize) -> Result<(), CuratorError> {
	match path {
		Some(path) => write_json(path, value),
		None => {
			let bytes = to_pretty_bytes(value)?;
			let mut stdout = io::stdout().lock();
			stdout.write_all(&bytes)?;
			stdout.flush()?;
			Ok(())
		}
	}
}
