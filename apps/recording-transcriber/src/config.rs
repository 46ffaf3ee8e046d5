use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_VERSION_ARGS};
use crate::worker::WorkerConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "recording-transcriber")]
#[command(about = "Transcription job queue and worker for recorded audio", long_about = None)]
pub struct Config {
	/// Executable used to run the transcription engine
	#[arg(long, env = "TRANSCRIPTION_ENGINE_PATH", default_value = "python3")]
	pub engine_path: PathBuf,

	/// Script passed to the engine executable before the audio path; empty runs the executable directly
	#[arg(long, env = "TRANSCRIPTION_SCRIPT_PATH", default_value = "transcribe.py")]
	pub engine_script: String,

	/// Module the readiness probe imports with `<engine> -c "import <module>"`; empty skips the import check
	#[arg(long, env = "TRANSCRIPTION_PROBE_MODULE", default_value = "faster_whisper")]
	pub engine_probe_module: String,

	/// Whisper model name handed to the engine
	#[arg(long, env = "WHISPER_MODEL_NAME", default_value = "base")]
	pub model_name: String,

	/// Poll interval of the transcription worker
	#[arg(long = "poll-interval-ms", env = "TRANSCRIPTION_WORKER_INTERVAL_MS", default_value = "2000", value_parser = parse_millis)]
	pub poll_interval: Duration,

	/// Wall-clock limit for one engine run
	#[arg(long = "timeout-ms", env = "TRANSCRIPTION_TIMEOUT_MS", default_value = "300000", value_parser = parse_millis)]
	pub transcription_timeout: Duration,

	/// Wall-clock limit for each readiness probe command
	#[arg(long = "probe-timeout-ms", env = "TRANSCRIPTION_PROBE_TIMEOUT_MS", default_value = "10000", value_parser = parse_millis)]
	pub probe_timeout: Duration,

	/// Start the transcription worker with the service
	#[arg(
		long,
		env = "TRANSCRIPTION_WORKER_ENABLED",
		default_value = "true",
		action = clap::ArgAction::Set,
		value_parser = clap::builder::BoolishValueParser::new()
	)]
	pub worker_enabled: bool,

	/// Address of the diagnostics/enqueue HTTP server
	#[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
	pub listen_addr: SocketAddr,

	/// Emit logs as flattened JSON events
	#[arg(long, env = "LOG_JSON", default_value = "false", action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
	pub log_json: bool,

	/// Service name for observability
	#[arg(long, env = "OTEL_SERVICE_NAME", default_value = "recording-transcriber")]
	pub service_name: String,
}

impl Config {
	/// Validate configuration values
	///
	/// # Errors
	/// Returns a description of the first invalid value.
	pub fn validate(&self) -> Result<(), String> {
		if self.engine_path.as_os_str().is_empty() {
			return Err("engine_path must not be empty".to_string());
		}

		if self.model_name.trim().is_empty() {
			return Err("model_name must not be empty".to_string());
		}

		if self.poll_interval.is_zero() {
			return Err("poll_interval_ms must be greater than 0".to_string());
		}

		if self.transcription_timeout.is_zero() {
			return Err("timeout_ms must be greater than 0".to_string());
		}

		if self.probe_timeout.is_zero() {
			return Err("probe_timeout_ms must be greater than 0".to_string());
		}

		Ok(())
	}

	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			program: self.engine_path.clone(),
			script: non_empty(&self.engine_script).map(PathBuf::from),
			probe_module: non_empty(&self.engine_probe_module).map(str::to_string),
			model_name: self.model_name.clone(),
			timeout: self.transcription_timeout,
			probe_timeout: self.probe_timeout,
			version_args: DEFAULT_VERSION_ARGS.iter().map(ToString::to_string).collect(),
		}
	}

	pub const fn worker_config(&self) -> WorkerConfig {
		WorkerConfig {
			poll_interval: self.poll_interval,
			enabled: self.worker_enabled,
		}
	}
}

fn non_empty(value: &str) -> Option<&str> {
	let value = value.trim();
	(!value.is_empty()).then_some(value)
}

fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_millis)
}
