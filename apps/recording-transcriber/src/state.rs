use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::queue::TranscriptionQueue;

/// Live counters for the worker, readable without touching the queue lock
#[derive(Debug, Default)]
pub struct WorkerState {
	pub is_transcribing: AtomicBool,
	pub jobs_processed: AtomicU64,
	pub jobs_failed: AtomicU64,
	/// Unix seconds of the last poll tick
	pub last_tick: AtomicU64,
}

impl WorkerState {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Register OpenTelemetry gauge callbacks for queue depth and worker activity
	pub fn register_gauges(self: &Arc<Self>, queue: &Arc<TranscriptionQueue>) {
		let meter = opentelemetry::global::meter("recording-transcriber");

		let queue_clone = Arc::clone(queue);
		let _queue_depth_reg = meter
			.u64_observable_gauge("transcriber.queue.depth")
			.with_description("Jobs waiting in the transcription queue")
			.with_callback(move |observer| {
				observer.observe(queue_clone.len() as u64, &[]);
			})
			.build();

		let queue_clone = Arc::clone(queue);
		let _processing_reg = meter
			.u64_observable_gauge("transcriber.queue.processing")
			.with_description("Jobs currently being transcribed")
			.with_callback(move |observer| {
				observer.observe(queue_clone.processing_count() as u64, &[]);
			})
			.build();

		let state_clone = Arc::clone(self);
		let _worker_busy_reg = meter
			.u64_observable_gauge("transcriber.worker.busy")
			.with_callback(move |observer| {
				observer.observe(u64::from(state_clone.is_transcribing()), &[]);
			})
			.build();

		let state_clone = Arc::clone(self);
		let _heartbeat_reg = meter
			.u64_observable_gauge("transcriber.heartbeat")
			.with_description("Last poll tick (unix seconds)")
			.with_callback(move |observer| {
				observer.observe(state_clone.last_tick.load(Ordering::Relaxed), &[]);
			})
			.build();
	}

	pub fn set_transcribing(&self, value: bool) {
		self.is_transcribing.store(value, Ordering::Relaxed);
	}

	pub fn is_transcribing(&self) -> bool {
		self.is_transcribing.load(Ordering::Relaxed)
	}

	pub fn record_tick(&self) {
		let now = chrono::Utc::now().timestamp();
		self.last_tick.store(u64::try_from(now).unwrap_or_default(), Ordering::Relaxed);
	}

	pub fn increment_processed(&self) {
		self.jobs_processed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_failed(&self) {
		self.jobs_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn processed(&self) -> u64 {
		self.jobs_processed.load(Ordering::Relaxed)
	}

	pub fn failed(&self) -> u64 {
		self.jobs_failed.load(Ordering::Relaxed)
	}
}
