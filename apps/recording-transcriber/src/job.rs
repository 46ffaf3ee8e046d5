use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TranscriptionError};

/// Opaque recording identifier, the dedup key for queued work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(String);

impl RecordingId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RecordingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RecordingId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for RecordingId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// Status of a recording row in the store.
///
/// The pipeline drives `Pending -> Recording -> Done | Error`. `Deleted` is
/// only ever set by other actors; later writes from here overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
	Pending,
	Recording,
	Done,
	Error,
	Deleted,
}

impl RecordingStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Recording => "recording",
			Self::Done => "done",
			Self::Error => "error",
			Self::Deleted => "deleted",
		}
	}

	/// Whether the pipeline has nothing further to write for this status.
	pub const fn is_terminal(self) -> bool {
		match self {
			Self::Done | Self::Error | Self::Deleted => true,
			Self::Pending | Self::Recording => false,
		}
	}
}

impl fmt::Display for RecordingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One request to transcribe a recording's audio file.
///
/// Owned by the queue until dequeued, then moved into the worker for the
/// duration of processing. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionJob {
	pub recording_id: RecordingId,

	/// Absolute or store-relative path to the audio asset
	pub file_path: PathBuf,

	/// Status of the recording when the job was created. Informational only
	pub status: RecordingStatus,

	pub added_at: DateTime<Utc>,
}

impl TranscriptionJob {
	pub fn new(recording_id: impl Into<RecordingId>, file_path: impl Into<PathBuf>) -> Self {
		Self::with_status(recording_id, file_path, RecordingStatus::Pending)
	}

	pub fn with_status(recording_id: impl Into<RecordingId>, file_path: impl Into<PathBuf>, status: RecordingStatus) -> Self {
		Self {
			recording_id: recording_id.into(),
			file_path: file_path.into(),
			status,
			added_at: Utc::now(),
		}
	}

	pub fn file_path(&self) -> &Path {
		&self.file_path
	}

	/// How long this job has been waiting since it was created
	pub fn queue_latency(&self) -> std::time::Duration {
		(Utc::now() - self.added_at).to_std().unwrap_or_default()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
	/// Seconds from the start of the audio
	pub start: f64,
	pub end: f64,
	pub text: String,
	/// Engine-reported, passed through without re-normalization
	pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTranscript {
	pub full_text: String,
	pub segments: Vec<TranscriptSegment>,
}

impl StructuredTranscript {
	/// Build a transcript from engine segments.
	///
	/// Rejects segments whose `start` goes backwards or whose `end` precedes
	/// `start`. `full_text` is the space-joined segment text.
	///
	/// # Errors
	/// Returns `MalformedOutput` when the segment ordering invariants do not hold.
	pub fn from_segments(segments: Vec<TranscriptSegment>) -> Result<Self> {
		let mut previous_start = f64::NEG_INFINITY;
		for (i, segment) in segments.iter().enumerate() {
			if !segment.start.is_finite() || !segment.end.is_finite() {
				return Err(TranscriptionError::MalformedOutput(format!("segment {i} has a non-finite timestamp")));
			}
			if segment.end < segment.start {
				return Err(TranscriptionError::MalformedOutput(format!(
					"segment {i} ends before it starts ({} < {})",
					segment.end, segment.start
				)));
			}
			if segment.start < previous_start {
				return Err(TranscriptionError::MalformedOutput(format!("segment {i} starts before the previous segment")));
			}
			previous_start = segment.start;
		}

		let full_text = segments.iter().map(|s| s.text.trim()).filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ");

		Ok(Self { full_text, segments })
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	/// End of the last segment, in seconds
	pub fn end_time(&self) -> f64 {
		self.segments.last().map_or(0.0, |s| s.end)
	}
}

/// Outcome of a successful transcription, handed back to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
	pub transcript: StructuredTranscript,
	pub language: Option<String>,
	pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
	pub queued: usize,
	pub processing: usize,
}
