use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::engine::Transcriber;
use crate::error::{Result, StoreError};
use crate::job::{QueueStats, RecordingId, TranscriptionJob};
use crate::observability::TranscriberMetrics;
use crate::queue::TranscriptionQueue;
use crate::store::RecordingStore;
use crate::worker::{TranscriptionWorker, WorkerConfig, WorkerStats};

/// Owner of the queue and its worker, built once at the composition root and
/// shared with the HTTP layer.
pub struct TranscriptionService {
	queue: Arc<TranscriptionQueue>,
	worker: TranscriptionWorker,
	store: Arc<dyn RecordingStore>,
	metrics: TranscriberMetrics,
}

impl TranscriptionService {
	pub fn new(transcriber: Arc<dyn Transcriber>, store: Arc<dyn RecordingStore>, worker_config: WorkerConfig, metrics: TranscriberMetrics) -> Self {
		let queue = Arc::new(TranscriptionQueue::new());
		let worker = TranscriptionWorker::new(Arc::clone(&queue), transcriber, worker_config, metrics.clone());

		Self { queue, worker, store, metrics }
	}

	/// Queue a recording for transcription.
	///
	/// Returns `false` when a job for the recording is already queued or in
	/// flight; the request is then dropped.
	pub fn enqueue_transcription(&self, recording_id: impl Into<RecordingId>, file_path: impl Into<PathBuf>) -> bool {
		let job = TranscriptionJob::new(recording_id, file_path);
		let recording_id = job.recording_id.clone();

		let admitted = self.queue.add(job);
		if admitted {
			self.metrics.jobs_enqueued.add(1, &[]);
		} else {
			self.metrics.jobs_deduplicated.add(1, &[]);
			info!(%recording_id, "Transcription already queued or in progress");
		}
		admitted
	}

	/// Queue a recording using the audio path stored for it.
	///
	/// # Errors
	/// Returns the store error when the recording cannot be looked up.
	pub async fn resubmit(&self, recording_id: &RecordingId) -> std::result::Result<bool, StoreError> {
		let file_path = self.store.get_file_path(recording_id).await?;
		Ok(self.enqueue_transcription(recording_id.clone(), file_path))
	}

	/// Cancel a job that has not started yet.
	pub fn cancel_transcription(&self, recording_id: &RecordingId) -> bool {
		let removed = self.queue.remove(recording_id);
		if removed {
			self.metrics.jobs_cancelled.add(1, &[]);
		}
		removed
	}

	/// # Errors
	/// Fails when the transcription engine is not available.
	pub async fn worker_start(&self) -> Result<()> {
		self.worker.start().await
	}

	pub fn worker_stop(&self) {
		self.worker.stop();
	}

	pub async fn worker_shutdown(&self, grace: Duration) {
		self.worker.shutdown(grace).await;
	}

	pub fn queue_stats(&self) -> QueueStats {
		self.queue.stats()
	}

	pub fn worker_stats(&self) -> WorkerStats {
		self.worker.stats()
	}

	pub const fn queue(&self) -> &Arc<TranscriptionQueue> {
		&self.queue
	}

	pub const fn worker(&self) -> &TranscriptionWorker {
		&self.worker
	}

	/// Publish queue depth and worker activity as observable gauges
	pub fn register_gauges(&self) {
		self.worker.state().register_gauges(&self.queue);
	}
}
