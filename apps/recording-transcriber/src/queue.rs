use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::job::{QueueStats, RecordingId, TranscriptionJob};

#[derive(Debug, Default)]
struct QueueState {
	pending: VecDeque<TranscriptionJob>,
	/// Ids that are pending or being processed
	known: HashSet<RecordingId>,
	processing: HashSet<RecordingId>,
}

/// In-memory FIFO of transcription jobs with at most one outstanding job
/// per recording.
///
/// All state sits behind one mutex, so check-and-insert in [`add`] cannot
/// interleave with another producer. The lock is never held across an await.
///
/// [`add`]: TranscriptionQueue::add
#[derive(Debug, Default)]
pub struct TranscriptionQueue {
	state: Mutex<QueueState>,
}

impl TranscriptionQueue {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, QueueState> {
		// The state stays consistent across every early return, so a poisoned
		// lock is still usable.
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Append a job unless its recording is already queued or in flight.
	///
	/// Returns whether the job was admitted.
	pub fn add(&self, job: TranscriptionJob) -> bool {
		let mut state = self.lock();

		if state.known.contains(&job.recording_id) {
			debug!(recording_id = %job.recording_id, "Job already known, ignoring");
			return false;
		}

		state.known.insert(job.recording_id.clone());
		let recording_id = job.recording_id.clone();
		state.pending.push_back(job);

		info!(%recording_id, queue_size = state.pending.len(), "📥 Job added to queue");
		true
	}

	/// Pop the oldest pending job and mark it as processing.
	pub fn get_next(&self) -> Option<TranscriptionJob> {
		let mut state = self.lock();

		let job = state.pending.pop_front()?;
		state.processing.insert(job.recording_id.clone());

		info!(
			recording_id = %job.recording_id,
			processing = state.processing.len(),
			queue_size = state.pending.len(),
			"📤 Job dequeued"
		);

		Some(job)
	}

	/// Forget a processed recording so it can be submitted again.
	///
	/// Unknown ids are ignored. A still-pending job for the id is left alone.
	pub fn complete(&self, recording_id: &RecordingId) {
		let mut state = self.lock();

		if !state.processing.remove(recording_id) {
			debug!(%recording_id, "Complete called for a job that is not processing");
			return;
		}
		state.known.remove(recording_id);

		info!(
			%recording_id,
			processing = state.processing.len(),
			queue_size = state.pending.len(),
			"✅ Job completed"
		);
	}

	/// Cancel a job that has not been dequeued yet.
	///
	/// Jobs already being processed are not affected.
	pub fn remove(&self, recording_id: &RecordingId) -> bool {
		let mut state = self.lock();

		let Some(index) = state.pending.iter().position(|job| &job.recording_id == recording_id) else {
			return false;
		};

		state.pending.remove(index);
		state.known.remove(recording_id);

		info!(%recording_id, queue_size = state.pending.len(), "🗑️ Job removed from queue");
		true
	}

	pub fn stats(&self) -> QueueStats {
		let state = self.lock();
		QueueStats {
			queued: state.pending.len(),
			processing: state.processing.len(),
		}
	}

	pub fn len(&self) -> usize {
		self.lock().pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().pending.is_empty()
	}

	pub fn has_jobs(&self) -> bool {
		!self.is_empty()
	}

	pub fn processing_count(&self) -> usize {
		self.lock().processing.len()
	}

	/// Whether a job for this recording is pending or in flight
	pub fn is_known(&self, recording_id: &RecordingId) -> bool {
		self.lock().known.contains(recording_id)
	}

	/// Drop every pending and processing entry.
	pub fn clear(&self) {
		let mut state = self.lock();
		state.pending.clear();
		state.processing.clear();
		state.known.clear();
	}
}
