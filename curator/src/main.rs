use anyhow::{bail, Context, Result};
use clap::Parser;
use curator_engine::config::{CliArgs, Command, CurationConfig};
use curator_engine::export::{write_json, write_json_or_stdout};
use curator_engine::pipeline::{run_curation, run_profile, CancellationFlag};
use curator_engine::sampling::sample_records;
use curator_engine::search::{top_similar, top_similar_to_id};
use curator_engine::server::CuratorServer;
use curator_engine::source::{load_json, load_records};
use curator_engine::transport::NdjsonTransport;
use serde_json::Value;

fn main() -> Result<()> {
	let args = CliArgs::parse();

	// Logs go to stderr; stdout carries reports and JSON-RPC
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	let cancel = CancellationFlag::new();

	match args.command {
		Command::Profile {
			input,
			output,
			curation,
		} => {
			let config = CurationConfig::from(curation);
			let records = load_records(&input)
				.with_context(|| format!("failed to load records from {}", input.display()))?;
			let outcome = run_profile(&records, &config, &cancel)?;
			write_json_or_stdout(output.as_deref(), &outcome.profile)
				.context("failed to write profile report")?;
		}

		Command::Curate {
			input,
			output,
			profile_output,
			duplicates_output,
			curation,
		} => {
			let config = CurationConfig::from(curation);
			let records = load_records(&input)
				.with_context(|| format!("failed to load records from {}", input.display()))?;
			let outcome = run_curation(&records, &config, &cancel)?;

			write_json(&profile_output, &outcome.profile).with_context(|| {
				format!("failed to write profile to {}", profile_output.display())
			})?;
			write_json(&output, &outcome.selection)
				.with_context(|| format!("failed to write selection to {}", output.display()))?;
			if let Some(path) = duplicates_output {
				write_json(&path, &outcome.duplicates)
					.with_context(|| format!("failed to write duplicates to {}", path.display()))?;
			}

			tracing::info!(
				records = records.len(),
				selected = outcome.selection.len(),
				groups = outcome.duplicates.groups.len(),
				"Curation complete"
			);
		}

		Command::Search {
			input,
			id,
			vector,
			top_k,
		} => {
			let records = load_records(&input)
				.with_context(|| format!("failed to load records from {}", input.display()))?;
			let matches = match (id, vector) {
				(Some(id), _) => top_similar_to_id(&id, &records, top_k)?,
				(None, Some(vector)) => top_similar(&vector, &records, top_k),
				(None, None) => bail!("either --id or --vector is required"),
			};
			write_json_or_stdout(None, &matches)?;
		}

		Command::Sample {
			input,
			output,
			size,
			seed,
		} => {
			let entries = match load_json(&input)
				.with_context(|| format!("failed to read {}", input.display()))?
			{
				Value::Array(entries) => entries,
				_ => bail!("{} does not hold a JSON array", input.display()),
			};
			let sample = sample_records(entries, size, seed)?;
			write_json(&output, &sample)
				.with_context(|| format!("failed to write sample to {}", output.display()))?;
		}

		Command::Serve => {
			let mut server = CuratorServer::new(NdjsonTransport::new());
			tracing::info!("curator-engine JSON-RPC server ready");
			server.run()?;
		}
	}

	Ok(())
}
