mod envelope;
mod process;

pub use envelope::{parse_output, EngineEnvelope};
pub use process::{resolve_program, run_probe, run_with_timeout, EngineRun};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{Result, TranscriptionError};
use crate::job::{RecordingId, RecordingStatus, TranscriptionResult};
use crate::observability::TranscriberMetrics;
use crate::store::{RecordingStore, RecordingUpdate};

/// Language hint handed to the engine; it detects the language itself
pub const LANGUAGE_AUTO: &str = "auto";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments for the probe run that proves the engine executes at all
pub const DEFAULT_VERSION_ARGS: &[&str] = &["--version"];

#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Executable to run, a path or a name looked up on `PATH`
	pub program: PathBuf,
	/// Optional script passed as the first argument (e.g. `transcribe.py`)
	pub script: Option<PathBuf>,
	/// Library the readiness probe must be able to import
	pub probe_module: Option<String>,
	pub model_name: String,
	pub timeout: Duration,
	pub probe_timeout: Duration,
	/// Arguments of the first probe run; it must exit zero within `probe_timeout`
	pub version_args: Vec<String>,
}

impl EngineConfig {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			script: None,
			probe_module: None,
			model_name: "base".to_string(),
			timeout: DEFAULT_TIMEOUT,
			probe_timeout: DEFAULT_PROBE_TIMEOUT,
			version_args: DEFAULT_VERSION_ARGS.iter().map(ToString::to_string).collect(),
		}
	}

	#[must_use]
	pub fn with_version_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.version_args = args.into_iter().map(Into::into).collect();
		self
	}

	#[must_use]
	pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
		self.script = Some(script.into());
		self
	}

	#[must_use]
	pub fn with_probe_module(mut self, module: impl Into<String>) -> Self {
		self.probe_module = Some(module.into());
		self
	}

	#[must_use]
	pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
		self.model_name = model_name.into();
		self
	}

	#[must_use]
	pub const fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}
}

/// Turns one recording's audio into a stored transcript or a stored error.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
	/// One-time readiness probe, called before the first `transcribe`.
	async fn initialize(&self) -> Result<()>;

	async fn transcribe(&self, recording_id: &RecordingId, file_path: &Path) -> Result<TranscriptionResult>;
}

/// Supervises an external speech-to-text process per job and records the
/// outcome in the recording store.
pub struct EngineAdapter {
	config: EngineConfig,
	store: Arc<dyn RecordingStore>,
	metrics: TranscriberMetrics,
	initialized: AtomicBool,
}

impl EngineAdapter {
	pub fn new(config: EngineConfig, store: Arc<dyn RecordingStore>, metrics: TranscriberMetrics) -> Self {
		Self {
			config,
			store,
			metrics,
			initialized: AtomicBool::new(false),
		}
	}

	pub const fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::Acquire)
	}

	/// `<engine> [script] <audio> --model <name> --language auto`
	fn command(&self, file_path: &Path) -> Command {
		let mut command = Command::new(&self.config.program);
		if let Some(script) = &self.config.script {
			command.arg(script);
		}
		command.arg(file_path).arg("--model").arg(&self.config.model_name).arg("--language").arg(LANGUAGE_AUTO);
		command
	}

	async fn run(&self, recording_id: &RecordingId, file_path: &Path) -> Result<TranscriptionResult> {
		if !tokio::fs::try_exists(file_path).await.unwrap_or(false) {
			return Err(TranscriptionError::FileNotFound(file_path.to_path_buf()));
		}

		self.write_status(recording_id, RecordingStatus::Recording, RecordingUpdate::default()).await;

		info!(
			%recording_id,
			engine = %self.config.program.display(),
			model = %self.config.model_name,
			file = %file_path.display(),
			"🎬 Running transcription engine"
		);

		let run = run_with_timeout(self.command(file_path), self.config.timeout, recording_id).await?;
		self.metrics.transcription_latency.record(run.elapsed.as_secs_f64() * 1000.0, &[]);

		if !run.status.success() {
			warn!(%recording_id, status = %run.status, "⚠️ Engine exited with non-zero status");
		}

		parse_output(&run.stdout)
	}

	/// Best-effort store write; failures are logged and counted, never raised.
	async fn write_status(&self, recording_id: &RecordingId, status: RecordingStatus, update: RecordingUpdate) {
		if let Err(e) = self.store.update_recording_status(recording_id, status, update).await {
			self.metrics.store_write_failures.add(1, &[KeyValue::new("status", status.as_str())]);
			warn!(%recording_id, %status, error = %e, "⚠️ Failed to update recording status");
		}
	}
}

#[async_trait]
impl Transcriber for EngineAdapter {
	async fn initialize(&self) -> Result<()> {
		let program = resolve_program(&self.config.program)
			.ok_or_else(|| TranscriptionError::EngineUnavailable(format!("executable {} not found", self.config.program.display())))?;

		let version_args: Vec<&str> = self.config.version_args.iter().map(String::as_str).collect();
		run_probe(&program, &version_args, self.config.probe_timeout)
			.await
			.map_err(|e| TranscriptionError::EngineUnavailable(format!("{} is not runnable: {e}", program.display())))?;

		if let Some(script) = &self.config.script {
			if !script.is_file() {
				return Err(TranscriptionError::EngineUnavailable(format!("transcription script not found: {}", script.display())));
			}
		}

		if let Some(module) = &self.config.probe_module {
			let import = format!("import {module}");
			run_probe(&program, &["-c", import.as_str()], self.config.probe_timeout)
				.await
				.map_err(|e| TranscriptionError::EngineUnavailable(format!("{module} is not importable: {e}")))?;
		}

		self.initialized.store(true, Ordering::Release);
		info!(engine = %program.display(), model = %self.config.model_name, "✅ Transcription engine initialized");
		Ok(())
	}

	async fn transcribe(&self, recording_id: &RecordingId, file_path: &Path) -> Result<TranscriptionResult> {
		if !self.is_initialized() {
			return Err(TranscriptionError::EngineUnavailable("transcribe called before initialize".to_string()));
		}

		info!(%recording_id, "🎤 Starting transcription");

		match self.run(recording_id, file_path).await {
			Ok(result) => {
				let segments = result.transcript.segments.len();
				self.write_status(recording_id, RecordingStatus::Done, RecordingUpdate::done(result.transcript.clone(), self.config.model_name.clone()))
					.await;
				self.metrics.transcriptions_completed.add(1, &[]);

				info!(%recording_id, segments, language = ?result.language, "✅ Transcription completed");
				Ok(result)
			}
			Err(err) => {
				self.write_status(recording_id, RecordingStatus::Error, RecordingUpdate::failed(err.to_string())).await;
				self.metrics.record_failure(err.kind());
				if err.is_timeout() {
					self.metrics.transcriptions_timed_out.add(1, &[]);
				}

				error!(%recording_id, error = %err, "❌ Transcription failed");
				Err(err)
			}
		}
	}
}
