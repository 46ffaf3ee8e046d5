//! Asynchronous transcription pipeline for recorded audio.
//!
//! Jobs are deduplicated per recording in [`queue::TranscriptionQueue`],
//! drained one at a time by [`worker::TranscriptionWorker`], and executed by
//! [`engine::EngineAdapter`], which runs an external speech-to-text process
//! and records the outcome through a [`store::RecordingStore`].

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod job;
pub mod observability;
pub mod queue;
pub mod service;
pub mod state;
pub mod store;
pub mod worker;

pub use engine::{EngineAdapter, EngineConfig, Transcriber};
pub use error::{Result, StoreError, TranscriptionError};
pub use job::{QueueStats, RecordingId, RecordingStatus, StructuredTranscript, TranscriptSegment, TranscriptionJob, TranscriptionResult};
pub use queue::TranscriptionQueue;
pub use service::TranscriptionService;
pub use store::{MemoryRecordingStore, RecordingRow, RecordingStore, RecordingUpdate};
pub use worker::{TranscriptionWorker, WorkerConfig, WorkerStats};
