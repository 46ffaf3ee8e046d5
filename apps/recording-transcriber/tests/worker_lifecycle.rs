// Worker loop behaviour against fake transcribers and a fake engine script
#![cfg(unix)]

use async_trait::async_trait;
use recording_transcriber::observability::TranscriberMetrics;
use recording_transcriber::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FAST_POLL: Duration = Duration::from_millis(20);

fn worker_config(poll_interval: Duration) -> WorkerConfig {
	WorkerConfig {
		poll_interval,
		enabled: true,
	}
}

/// Poll `condition` every 10ms until it holds or `deadline` passes
async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
	let wait = async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	};
	tokio::time::timeout(deadline, wait).await.is_ok()
}

// ============================================================================
// Fake transcribers
// ============================================================================

#[derive(Default)]
struct CountingTranscriber {
	calls: AtomicUsize,
	fail_initialize: bool,
}

#[async_trait]
impl Transcriber for CountingTranscriber {
	async fn initialize(&self) -> Result<()> {
		if self.fail_initialize {
			return Err(TranscriptionError::EngineUnavailable("python3 not found".to_string()));
		}
		Ok(())
	}

	async fn transcribe(&self, _recording_id: &RecordingId, _file_path: &Path) -> Result<TranscriptionResult> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(TranscriptionResult {
			transcript: StructuredTranscript::from_segments(Vec::new())?,
			language: Some("en".to_string()),
			duration: Some(0.0),
		})
	}
}

/// Panics for recordings whose id starts with `panic`
struct PanickingTranscriber;

#[async_trait]
impl Transcriber for PanickingTranscriber {
	async fn initialize(&self) -> Result<()> {
		Ok(())
	}

	async fn transcribe(&self, recording_id: &RecordingId, _file_path: &Path) -> Result<TranscriptionResult> {
		assert!(!recording_id.as_str().starts_with("panic"), "engine crashed");
		Ok(TranscriptionResult {
			transcript: StructuredTranscript::from_segments(Vec::new())?,
			language: None,
			duration: None,
		})
	}
}

/// Takes `delay` per job and records the peak number of overlapping calls
struct SlowTranscriber {
	delay: Duration,
	calls: AtomicUsize,
	active: AtomicUsize,
	max_active: AtomicUsize,
}

impl SlowTranscriber {
	fn new(delay: Duration) -> Self {
		Self {
			delay,
			calls: AtomicUsize::new(0),
			active: AtomicUsize::new(0),
			max_active: AtomicUsize::new(0),
		}
	}

	fn active(&self) -> usize {
		self.active.load(Ordering::SeqCst)
	}

	fn max_active(&self) -> usize {
		self.max_active.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Transcriber for SlowTranscriber {
	async fn initialize(&self) -> Result<()> {
		Ok(())
	}

	async fn transcribe(&self, _recording_id: &RecordingId, _file_path: &Path) -> Result<TranscriptionResult> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_active.fetch_max(now, Ordering::SeqCst);

		tokio::time::sleep(self.delay).await;

		self.active.fetch_sub(1, Ordering::SeqCst);
		Ok(TranscriptionResult {
			transcript: StructuredTranscript::from_segments(Vec::new())?,
			language: None,
			duration: None,
		})
	}
}

fn worker_with(transcriber: Arc<dyn Transcriber>, config: WorkerConfig) -> (Arc<TranscriptionQueue>, TranscriptionWorker) {
	let queue = Arc::new(TranscriptionQueue::new());
	let worker = TranscriptionWorker::new(Arc::clone(&queue), transcriber, config, TranscriberMetrics::local());
	(queue, worker)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_fails_fast_when_engine_unavailable() {
	let transcriber = Arc::new(CountingTranscriber {
		fail_initialize: true,
		..CountingTranscriber::default()
	});
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));
	queue.add(TranscriptionJob::new("rec-1", "/audio/rec-1.webm"));

	let err = worker.start().await.unwrap_err();
	assert!(matches!(err, TranscriptionError::EngineUnavailable(_)));
	assert!(!worker.is_running());

	tokio::time::sleep(FAST_POLL * 5).await;
	assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
	assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_start_is_idempotent() {
	let (_queue, worker) = worker_with(Arc::new(CountingTranscriber::default()), worker_config(FAST_POLL));

	worker.start().await.unwrap();
	worker.start().await.unwrap();
	assert!(worker.is_running());

	worker.stop();
	assert!(!worker.is_running());
	worker.stop();
}

#[tokio::test]
async fn test_disabled_worker_never_starts() {
	let config = WorkerConfig {
		poll_interval: FAST_POLL,
		enabled: false,
	};
	let (queue, worker) = worker_with(Arc::new(CountingTranscriber::default()), config);
	queue.add(TranscriptionJob::new("rec-1", "/audio/rec-1.webm"));

	worker.start().await.unwrap();
	assert!(!worker.is_running());

	tokio::time::sleep(FAST_POLL * 5).await;
	assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_worker_drains_queue_in_order() {
	let transcriber = Arc::new(CountingTranscriber::default());
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	for i in 0..3 {
		queue.add(TranscriptionJob::new(format!("rec-{i}"), format!("/audio/rec-{i}.webm")));
	}
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || {
		let stats = worker.stats();
		stats.jobs_processed == 3 && stats.processing_count == 0
	})
	.await);
	assert!(queue.is_empty());
	assert_eq!(queue.processing_count(), 0);
	assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);

	worker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_stop_prevents_further_dequeues() {
	let transcriber = Arc::new(CountingTranscriber::default());
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	worker.start().await.unwrap();
	worker.stop();

	queue.add(TranscriptionJob::new("rec-1", "/audio/rec-1.webm"));
	tokio::time::sleep(FAST_POLL * 10).await;

	assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
	assert_eq!(queue.len(), 1);
	assert!(!worker.stats().running);
}

#[tokio::test]
async fn test_run_once_processes_single_job() {
	let transcriber = Arc::new(CountingTranscriber::default());
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	assert!(!worker.run_once().await);

	queue.add(TranscriptionJob::new("rec-1", "/audio/rec-1.webm"));
	queue.add(TranscriptionJob::new("rec-2", "/audio/rec-2.webm"));

	assert!(worker.run_once().await);
	assert_eq!(queue.len(), 1);
	assert!(!queue.is_known(&RecordingId::new("rec-1")));
	assert_eq!(worker.state().processed(), 1);
}

#[tokio::test]
async fn test_stop_lets_in_flight_job_finish() {
	let transcriber = Arc::new(SlowTranscriber::new(Duration::from_millis(300)));
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	queue.add(TranscriptionJob::new("rec-a", "/audio/rec-a.webm"));
	queue.add(TranscriptionJob::new("rec-b", "/audio/rec-b.webm"));
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || transcriber.active() == 1).await);
	worker.stop();

	assert!(wait_until(Duration::from_secs(5), || {
		let stats = worker.stats();
		stats.jobs_processed == 1 && stats.processing_count == 0
	})
	.await);
	assert!(!queue.is_known(&RecordingId::new("rec-a")));

	tokio::time::sleep(FAST_POLL * 10).await;
	assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
	assert_eq!(queue.len(), 1);
	assert!(queue.is_known(&RecordingId::new("rec-b")));
}

// ============================================================================
// One transcription at a time
// ============================================================================

#[tokio::test]
async fn test_run_once_waits_for_loop_job() {
	let transcriber = Arc::new(SlowTranscriber::new(Duration::from_millis(300)));
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	queue.add(TranscriptionJob::new("rec-a", "/audio/rec-a.webm"));
	queue.add(TranscriptionJob::new("rec-b", "/audio/rec-b.webm"));
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || transcriber.active() == 1).await);
	worker.run_once().await;

	assert!(wait_until(Duration::from_secs(5), || worker.stats().jobs_processed == 2).await);
	assert_eq!(transcriber.max_active(), 1);

	worker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_restart_mid_job_does_not_overlap() {
	let transcriber = Arc::new(SlowTranscriber::new(Duration::from_millis(300)));
	let (queue, worker) = worker_with(transcriber.clone(), worker_config(FAST_POLL));

	queue.add(TranscriptionJob::new("rec-a", "/audio/rec-a.webm"));
	queue.add(TranscriptionJob::new("rec-b", "/audio/rec-b.webm"));
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || transcriber.active() == 1).await);
	worker.stop();
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || worker.stats().jobs_processed == 2).await);
	assert_eq!(transcriber.max_active(), 1);
	assert!(queue.is_empty());

	worker.shutdown(Duration::from_secs(1)).await;
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_panicking_job_is_released_and_loop_survives() {
	let (queue, worker) = worker_with(Arc::new(PanickingTranscriber), worker_config(FAST_POLL));

	queue.add(TranscriptionJob::new("panic-1", "/audio/panic-1.webm"));
	queue.add(TranscriptionJob::new("rec-2", "/audio/rec-2.webm"));
	worker.start().await.unwrap();

	assert!(wait_until(Duration::from_secs(5), || {
		let stats = worker.stats();
		stats.jobs_processed == 1 && stats.jobs_failed == 1 && stats.processing_count == 0
	})
	.await);

	assert!(worker.is_running());
	assert!(!queue.is_known(&RecordingId::new("panic-1")));
	assert!(queue.add(TranscriptionJob::new("panic-1", "/audio/panic-1.webm")), "id must be admissible again");

	worker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_worker_survives_bad_engine_output() {
	let dir = tempfile::tempdir().unwrap();
	let script = dir.path().join("engine.sh");
	std::fs::write(
		&script,
		r#"#!/bin/sh
case "$1" in
	*/bad.webm) echo 'not json at all' ;;
	*) echo '{"success": true, "transcript": "ok", "segments": [{"start":0,"end":1,"text":"ok","confidence":0.9}], "language": "en", "duration": 1.0}' ;;
esac
"#,
	)
	.unwrap();

	let bad = dir.path().join("bad.webm");
	let good = dir.path().join("good.webm");
	std::fs::write(&bad, b"x").unwrap();
	std::fs::write(&good, b"x").unwrap();

	let store = Arc::new(MemoryRecordingStore::new());
	store.insert(RecordingRow::new("bad", bad.clone())).await;
	store.insert(RecordingRow::new("good", good.clone())).await;

	let adapter = Arc::new(EngineAdapter::new(EngineConfig::new("/bin/sh").with_version_args(["-c", "exit 0"]).with_script(&script), store.clone(), TranscriberMetrics::local()));
	let service = TranscriptionService::new(adapter, store.clone(), worker_config(FAST_POLL), TranscriberMetrics::local());

	assert!(service.enqueue_transcription("bad", bad));
	assert!(service.enqueue_transcription("good", good));
	service.worker_start().await.unwrap();

	assert!(wait_until(Duration::from_secs(10), || {
		let stats = service.worker_stats();
		stats.queue_size == 0 && stats.processing_count == 0 && stats.jobs_processed + stats.jobs_failed == 2
	})
	.await);

	let stats = service.worker_stats();
	assert!(stats.running);
	assert_eq!((stats.jobs_processed, stats.jobs_failed), (1, 1));

	assert_eq!(store.get(&RecordingId::new("bad")).await.unwrap().status, RecordingStatus::Error);
	let good_row = store.get(&RecordingId::new("good")).await.unwrap();
	assert_eq!(good_row.status, RecordingStatus::Done);
	assert_eq!(good_row.transcript.unwrap().full_text, "ok");

	service.worker_shutdown(Duration::from_secs(1)).await;
	assert!(!service.worker_stats().running);
}
