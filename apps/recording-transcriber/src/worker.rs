use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::Transcriber;
use crate::error::Result;
use crate::job::RecordingId;
use crate::observability::TranscriberMetrics;
use crate::queue::TranscriptionQueue;
use crate::state::WorkerState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
	pub poll_interval: Duration,
	pub enabled: bool,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			poll_interval: DEFAULT_POLL_INTERVAL,
			enabled: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
	pub running: bool,
	pub queue_size: usize,
	pub processing_count: usize,
	pub jobs_processed: u64,
	pub jobs_failed: u64,
}

/// Returns the recording id to the queue when dropped, whatever way the job
/// ended.
struct CompletionGuard {
	queue: Arc<TranscriptionQueue>,
	recording_id: RecordingId,
}

impl Drop for CompletionGuard {
	fn drop(&mut self) {
		self.queue.complete(&self.recording_id);
	}
}

/// Everything one poll tick needs, shared between the loop task and
/// [`TranscriptionWorker::run_once`].
#[derive(Clone)]
struct JobRunner {
	queue: Arc<TranscriptionQueue>,
	transcriber: Arc<dyn Transcriber>,
	state: Arc<WorkerState>,
	metrics: TranscriberMetrics,
	/// Held for a whole job; at most one transcription runs across loops and `run_once`
	job_slot: Arc<tokio::sync::Mutex<()>>,
}

impl JobRunner {
	/// Dequeue and transcribe at most one job. Returns whether a job ran.
	async fn process_next_job(&self) -> bool {
		let _slot = self.job_slot.lock().await;
		self.state.record_tick();

		let Some(job) = self.queue.get_next() else {
			return false;
		};

		let _completion = CompletionGuard {
			queue: Arc::clone(&self.queue),
			recording_id: job.recording_id.clone(),
		};
		let recording_id = job.recording_id.clone();

		let queue_latency_ms = job.queue_latency().as_secs_f64() * 1000.0;
		self.metrics.queue_latency.record(queue_latency_ms, &[]);
		info!(%recording_id, queue_latency_ms = format!("{:.0}", queue_latency_ms), "📥 Processing job");

		self.state.set_transcribing(true);

		// The job runs in its own task so a panic inside the transcriber is
		// reported as a JoinError instead of unwinding through the loop.
		let transcriber = Arc::clone(&self.transcriber);
		let outcome = tokio::spawn(async move { transcriber.transcribe(&job.recording_id, &job.file_path).await }).await;

		match outcome {
			Ok(Ok(_)) => {
				self.state.increment_processed();
				info!(%recording_id, "✨ Successfully processed job");
			}
			Ok(Err(e)) => {
				self.state.increment_failed();
				error!(%recording_id, error = %e, "❌ Failed to process job");
			}
			Err(e) => {
				self.state.increment_failed();
				error!(%recording_id, error = %e, "💥 Transcription task aborted");
			}
		}

		self.state.set_transcribing(false);
		true
	}
}

struct RunningLoop {
	cancellation_token: CancellationToken,
	handle: JoinHandle<()>,
}

/// Single consumer of the transcription queue.
///
/// Polls on a fixed interval and runs at most one job at a time. Job errors
/// are logged and never stop the loop; the job's recording id is always
/// released back to the queue.
pub struct TranscriptionWorker {
	runner: JobRunner,
	config: WorkerConfig,
	running: AtomicBool,
	slot: Mutex<Option<RunningLoop>>,
}

impl TranscriptionWorker {
	pub fn new(queue: Arc<TranscriptionQueue>, transcriber: Arc<dyn Transcriber>, config: WorkerConfig, metrics: TranscriberMetrics) -> Self {
		Self {
			runner: JobRunner {
				queue,
				transcriber,
				state: WorkerState::new(),
				metrics,
				job_slot: Arc::new(tokio::sync::Mutex::new(())),
			},
			config,
			running: AtomicBool::new(false),
			slot: Mutex::new(None),
		}
	}

	/// Initialize the transcriber and start polling.
	///
	/// A no-op when already running or disabled by configuration.
	///
	/// # Errors
	/// Propagates the transcriber's initialization error; the worker stays stopped.
	pub async fn start(&self) -> Result<()> {
		if self.is_running() {
			info!("Worker is already running");
			return Ok(());
		}

		if !self.config.enabled {
			info!("Transcription worker is disabled");
			return Ok(());
		}

		if let Err(e) = self.runner.transcriber.initialize().await {
			error!(error = %e, "❌ Failed to start transcription worker");
			return Err(e);
		}

		let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
		if slot.is_some() {
			return Ok(());
		}

		let cancellation_token = CancellationToken::new();
		let handle = tokio::spawn(poll_loop(self.runner.clone(), self.config.poll_interval, cancellation_token.clone()));
		*slot = Some(RunningLoop { cancellation_token, handle });
		self.running.store(true, Ordering::Release);

		info!(poll_interval_ms = self.config.poll_interval.as_millis(), "🏭 Transcription worker started");
		Ok(())
	}

	/// Stop scheduling poll ticks. A job already running is left to finish, and
	/// a later `start` does not dequeue until it has.
	pub fn stop(&self) {
		if let Some(running) = self.take_loop() {
			running.cancellation_token.cancel();
			info!("🛑 Transcription worker stopped");
		}
	}

	/// Stop and wait up to `grace` for an in-flight job to finish.
	pub async fn shutdown(&self, grace: Duration) {
		let Some(running) = self.take_loop() else {
			return;
		};
		running.cancellation_token.cancel();

		if tokio::time::timeout(grace, running.handle).await.is_err() {
			warn!(grace_ms = grace.as_millis(), "⚠️ In-flight transcription still running at shutdown");
		}
		info!("🛑 Transcription worker shut down");
	}

	fn take_loop(&self) -> Option<RunningLoop> {
		let running = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
		self.running.store(false, Ordering::Release);
		running
	}

	/// Run one poll tick now. Waits for a job already in flight to finish first.
	pub async fn run_once(&self) -> bool {
		self.runner.process_next_job().await
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	pub const fn state(&self) -> &Arc<WorkerState> {
		&self.runner.state
	}

	pub fn stats(&self) -> WorkerStats {
		let queue = self.runner.queue.stats();
		WorkerStats {
			running: self.is_running(),
			queue_size: queue.queued,
			processing_count: queue.processing,
			jobs_processed: self.runner.state.processed(),
			jobs_failed: self.runner.state.failed(),
		}
	}
}

impl Drop for TranscriptionWorker {
	fn drop(&mut self) {
		self.stop();
	}
}

async fn poll_loop(runner: JobRunner, poll_interval: Duration, cancellation_token: CancellationToken) {
	info!("🔄 Worker loop started, waiting for jobs...");

	// First tick after one full interval; a long job delays the next tick
	// rather than causing a burst.
	let mut interval = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			() = cancellation_token.cancelled() => break,
			_ = interval.tick() => {
				if cancellation_token.is_cancelled() {
					break;
				}
				runner.process_next_job().await;
			}
		}
	}

	info!("✅ Worker loop exiting");
}
