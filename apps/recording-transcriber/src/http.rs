use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

use crate::error::StoreError;
use crate::job::{QueueStats, RecordingId};
use crate::service::TranscriptionService;
use crate::store::{MemoryRecordingStore, RecordingRow};
use crate::worker::WorkerStats;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<TranscriptionService>,
	pub recordings: Arc<MemoryRecordingStore>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error("recording {0} not found")]
	NotFound(RecordingId),

	#[error("recording store unavailable: {0}")]
	Store(String),
}

impl From<StoreError> for ApiError {
	fn from(error: StoreError) -> Self {
		match error {
			StoreError::NotFound(id) => Self::NotFound(RecordingId::new(id)),
			StoreError::Unavailable(reason) => Self::Store(reason),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		#[derive(Serialize)]
		struct ErrorBody {
			error: String,
		}

		let status = match self {
			Self::NotFound(_) => StatusCode::NOT_FOUND,
			Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
		};
		(status, Json(ErrorBody { error: self.to_string() })).into_response()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordingRequest {
	pub id: RecordingId,
	pub file_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
	pub recording_id: RecordingId,
	pub queued: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
	pub removed: bool,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/recordings", post(create_recording))
		.route("/recordings/:recording_id", get(get_recording))
		.route("/transcriptions/stats", get(queue_stats))
		.route("/transcriptions/:recording_id", post(resubmit).delete(cancel))
		.with_state(state)
}

#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> Json<WorkerStats> {
	Json(state.service.worker_stats())
}

#[instrument(skip(state, request), fields(recording_id = %request.id))]
async fn create_recording(State(state): State<AppState>, Json(request): Json<CreateRecordingRequest>) -> (StatusCode, Json<EnqueueResponse>) {
	state.recordings.insert(RecordingRow::new(request.id.clone(), request.file_path.clone())).await;
	let queued = state.service.enqueue_transcription(request.id.clone(), request.file_path);

	(
		StatusCode::ACCEPTED,
		Json(EnqueueResponse {
			recording_id: request.id,
			queued,
		}),
	)
}

#[instrument(skip(state))]
async fn get_recording(State(state): State<AppState>, Path(recording_id): Path<RecordingId>) -> Result<Json<RecordingRow>, ApiError> {
	state.recordings.get(&recording_id).await.map(Json).ok_or(ApiError::NotFound(recording_id))
}

#[instrument(skip(state))]
async fn resubmit(State(state): State<AppState>, Path(recording_id): Path<RecordingId>) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
	let queued = state.service.resubmit(&recording_id).await?;
	Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { recording_id, queued })))
}

#[instrument(skip(state))]
async fn cancel(State(state): State<AppState>, Path(recording_id): Path<RecordingId>) -> Json<CancelResponse> {
	Json(CancelResponse {
		removed: state.service.cancel_transcription(&recording_id),
	})
}

async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
	Json(state.service.queue_stats())
}
