use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscriptionError {
	#[error("Audio file not found: {}", .0.display())]
	FileNotFound(PathBuf),

	#[error("Transcription engine not available: {0}")]
	EngineUnavailable(String),

	#[error("Failed to spawn transcription process: {0}")]
	SpawnFailure(#[source] std::io::Error),

	#[error("Transcription timed out after {}ms", .0.as_millis())]
	TranscriptionTimeout(Duration),

	/// Carries the engine's own message verbatim.
	#[error("{0}")]
	EngineReportedFailure(String),

	#[error("Malformed transcription output: {0}")]
	MalformedOutput(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl TranscriptionError {
	/// Short stable label for metrics attributes.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::FileNotFound(_) => "file_not_found",
			Self::EngineUnavailable(_) => "engine_unavailable",
			Self::SpawnFailure(_) => "spawn_failure",
			Self::TranscriptionTimeout(_) => "timeout",
			Self::EngineReportedFailure(_) => "engine_reported",
			Self::MalformedOutput(_) => "malformed_output",
			Self::Io(_) => "io",
		}
	}

	pub const fn is_timeout(&self) -> bool {
		matches!(self, Self::TranscriptionTimeout(_))
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
	#[error("Recording {0} not found")]
	NotFound(String),

	#[error("Recording store unavailable: {0}")]
	Unavailable(String),
}

pub type Result<T> = std::result::Result<T, TranscriptionError>;
