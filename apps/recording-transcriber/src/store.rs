use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::job::{RecordingId, RecordingStatus, StructuredTranscript};

/// Fields written together with a status change. `None` leaves the column as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingUpdate {
	pub transcript: Option<StructuredTranscript>,
	pub transcript_progress: Option<u8>,
	pub transcription_model: Option<String>,
	pub error_message: Option<String>,
}

impl RecordingUpdate {
	pub fn done(transcript: StructuredTranscript, model: impl Into<String>) -> Self {
		Self {
			transcript: Some(transcript),
			transcript_progress: Some(100),
			transcription_model: Some(model.into()),
			error_message: None,
		}
	}

	pub fn failed(message: impl Into<String>) -> Self {
		Self {
			error_message: Some(message.into()),
			..Self::default()
		}
	}
}

/// Key-based access to recording rows.
///
/// Implementations are expected to make each call atomic for its row. The
/// pipeline never coordinates writes across rows.
#[async_trait]
pub trait RecordingStore: Send + Sync + 'static {
	async fn update_recording_status(&self, id: &RecordingId, status: RecordingStatus, update: RecordingUpdate) -> Result<(), StoreError>;

	async fn get_file_path(&self, id: &RecordingId) -> Result<PathBuf, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRow {
	pub id: RecordingId,
	pub file_path: PathBuf,
	pub status: RecordingStatus,
	pub transcript: Option<StructuredTranscript>,
	pub transcript_progress: Option<u8>,
	pub transcription_model: Option<String>,
	pub error_message: Option<String>,
	pub updated_at: DateTime<Utc>,
}

impl RecordingRow {
	pub fn new(id: impl Into<RecordingId>, file_path: impl Into<PathBuf>) -> Self {
		Self {
			id: id.into(),
			file_path: file_path.into(),
			status: RecordingStatus::Pending,
			transcript: None,
			transcript_progress: None,
			transcription_model: None,
			error_message: None,
			updated_at: Utc::now(),
		}
	}
}

/// Recording store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordingStore {
	rows: RwLock<HashMap<RecordingId, RecordingRow>>,
}

impl MemoryRecordingStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn insert(&self, row: RecordingRow) {
		self.rows.write().await.insert(row.id.clone(), row);
	}

	pub async fn get(&self, id: &RecordingId) -> Option<RecordingRow> {
		self.rows.read().await.get(id).cloned()
	}

	pub async fn len(&self) -> usize {
		self.rows.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.rows.read().await.is_empty()
	}
}

#[async_trait]
impl RecordingStore for MemoryRecordingStore {
	async fn update_recording_status(&self, id: &RecordingId, status: RecordingStatus, update: RecordingUpdate) -> Result<(), StoreError> {
		let mut rows = self.rows.write().await;
		let row = rows.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;

		row.status = status;
		if let Some(transcript) = update.transcript {
			row.transcript = Some(transcript);
		}
		if let Some(progress) = update.transcript_progress {
			row.transcript_progress = Some(progress.min(100));
		}
		if let Some(model) = update.transcription_model {
			row.transcription_model = Some(model);
		}
		if let Some(message) = update.error_message {
			row.error_message = Some(message);
		}
		row.updated_at = Utc::now();

		drop(rows);
		Ok(())
	}

	async fn get_file_path(&self, id: &RecordingId) -> Result<PathBuf, StoreError> {
		self.rows.read().await.get(id).map(|row| row.file_path.clone()).ok_or_else(|| StoreError::NotFound(id.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_update_unknown_recording_fails() {
		let store = MemoryRecordingStore::new();
		let err = store
			.update_recording_status(&RecordingId::new("missing"), RecordingStatus::Done, RecordingUpdate::default())
			.await
			.unwrap_err();
		assert_eq!(err, StoreError::NotFound("missing".to_string()));
	}

	#[tokio::test]
	async fn test_update_overwrites_deleted_status() {
		let store = MemoryRecordingStore::new();
		let mut row = RecordingRow::new("rec", "/a.webm");
		row.status = RecordingStatus::Deleted;
		store.insert(row).await;

		let id = RecordingId::new("rec");
		store.update_recording_status(&id, RecordingStatus::Error, RecordingUpdate::failed("boom")).await.unwrap();

		let row = store.get(&id).await.unwrap();
		assert_eq!(row.status, RecordingStatus::Error);
		assert_eq!(row.error_message.as_deref(), Some("boom"));
	}

	#[tokio::test]
	async fn test_status_only_update_keeps_fields() {
		let store = MemoryRecordingStore::new();
		store.insert(RecordingRow::new("rec", "/a.webm")).await;
		let id = RecordingId::new("rec");

		store.update_recording_status(&id, RecordingStatus::Error, RecordingUpdate::failed("first")).await.unwrap();
		store.update_recording_status(&id, RecordingStatus::Recording, RecordingUpdate::default()).await.unwrap();

		let row = store.get(&id).await.unwrap();
		assert_eq!(row.status, RecordingStatus::Recording);
		assert_eq!(row.error_message.as_deref(), Some("first"));
		assert_eq!(store.get_file_path(&id).await.unwrap(), PathBuf::from("/a.webm"));
	}
}
