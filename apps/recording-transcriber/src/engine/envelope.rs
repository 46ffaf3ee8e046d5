use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TranscriptionError};
use crate::job::{StructuredTranscript, TranscriptSegment, TranscriptionResult};

const DEFAULT_FAILURE_MESSAGE: &str = "Transcription failed";

/// The single JSON object an engine run prints as its last stdout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEnvelope {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transcript: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub segments: Option<Vec<TranscriptSegment>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl EngineEnvelope {
	/// Validate the envelope and turn it into a transcription result.
	///
	/// # Errors
	/// `EngineReportedFailure` for `success: false`, `MalformedOutput` when a
	/// successful envelope lacks `transcript` or `segments`.
	pub fn into_result(self) -> Result<TranscriptionResult> {
		if !self.success {
			let message = self.error.filter(|e| !e.trim().is_empty()).unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
			return Err(TranscriptionError::EngineReportedFailure(message));
		}

		let Some(text) = self.transcript else {
			return Err(TranscriptionError::MalformedOutput("engine reported success without a transcript".to_string()));
		};
		let Some(segments) = self.segments else {
			return Err(TranscriptionError::MalformedOutput("engine reported success without segments".to_string()));
		};

		let transcript = StructuredTranscript::from_segments(segments)?;
		if text.split_whitespace().ne(transcript.full_text.split_whitespace()) {
			debug!(
				engine_chars = text.len(),
				segment_chars = transcript.full_text.len(),
				"Engine transcript differs from joined segments, keeping segment text"
			);
		}

		Ok(TranscriptionResult {
			transcript,
			language: self.language,
			duration: self.duration,
		})
	}
}

/// Parse the engine's captured stdout.
///
/// Only the last non-empty line is considered. Anything before it is noise the
/// engine is allowed to print.
///
/// # Errors
/// `MalformedOutput` for empty output or a last line that is not an envelope,
/// plus everything [`EngineEnvelope::into_result`] rejects.
pub fn parse_output(stdout: &str) -> Result<TranscriptionResult> {
	let line = stdout
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.last()
		.ok_or_else(|| TranscriptionError::MalformedOutput("No output from transcription engine".to_string()))?;

	let envelope: EngineEnvelope =
		serde_json::from_str(line).map_err(|e| TranscriptionError::MalformedOutput(format!("Failed to parse transcription output ({e}): {}", truncate(line, 200))))?;

	envelope.into_result()
}

fn truncate(s: &str, max_chars: usize) -> String {
	match s.char_indices().nth(max_chars) {
		Some((idx, _)) => format!("{}…", &s[..idx]),
		None => s.to_string(),
	}
}
