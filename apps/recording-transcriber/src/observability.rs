use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{
	global,
	metrics::{Counter, Histogram, Meter},
	KeyValue,
};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
	metrics::{PeriodicReader, SdkMeterProvider},
	trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
	Resource,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing::Subscriber;
use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "info,recording_transcriber=debug";

/// Metrics for the transcription pipeline
#[derive(Clone)]
pub struct TranscriberMetrics {
	// Queue counters
	pub jobs_enqueued: Counter<u64>,
	pub jobs_deduplicated: Counter<u64>,
	pub jobs_cancelled: Counter<u64>,

	// Transcription counters
	pub transcriptions_completed: Counter<u64>,
	pub transcriptions_failed: Counter<u64>,
	pub transcriptions_timed_out: Counter<u64>,
	pub store_write_failures: Counter<u64>,

	// Histograms
	pub queue_latency: Histogram<f64>,
	pub transcription_latency: Histogram<f64>,
}

impl TranscriberMetrics {
	pub fn new(meter: &Meter) -> Self {
		Self {
			jobs_enqueued: meter
				.u64_counter("transcriber.jobs.enqueued")
				.with_description("Jobs admitted to the transcription queue")
				.build(),
			jobs_deduplicated: meter
				.u64_counter("transcriber.jobs.deduplicated")
				.with_description("Enqueue requests ignored because the recording was already queued or processing")
				.build(),
			jobs_cancelled: meter
				.u64_counter("transcriber.jobs.cancelled")
				.with_description("Pending jobs removed before processing")
				.build(),

			transcriptions_completed: meter
				.u64_counter("transcriber.transcriptions.completed")
				.with_description("Total successful transcriptions")
				.build(),
			transcriptions_failed: meter
				.u64_counter("transcriber.transcriptions.failed")
				.with_description("Total failed transcriptions")
				.build(),
			transcriptions_timed_out: meter
				.u64_counter("transcriber.transcriptions.timed_out")
				.with_description("Engine runs killed on timeout")
				.build(),
			store_write_failures: meter
				.u64_counter("transcriber.store.write_failures")
				.with_description("Recording store updates that failed and were skipped")
				.build(),

			queue_latency: meter
				.f64_histogram("transcriber.queue.latency")
				.with_description("Time a job waited in the queue (ms)")
				.build(),
			transcription_latency: meter
				.f64_histogram("transcriber.transcription.latency")
				.with_description("Wall-clock time of one engine run (ms)")
				.build(),
		}
	}

	/// Metrics backed by whatever global meter provider is installed.
	///
	/// Without a provider every instrument is a no-op, which is what tests use.
	pub fn local() -> Self {
		Self::new(&global::meter("recording-transcriber-local"))
	}

	pub fn record_failure(&self, kind: &'static str) {
		self.transcriptions_failed.add(1, &[KeyValue::new("error", kind)]);
	}
}

/// Exporter providers kept alive for the process lifetime.
pub struct Telemetry {
	tracer_provider: SdkTracerProvider,
	meter_provider: SdkMeterProvider,
}

impl Telemetry {
	/// Flush and stop the exporters
	pub fn shutdown(self) {
		if let Err(e) = self.tracer_provider.shutdown() {
			warn!(error = %e, "Failed to shut down tracer provider");
		}
		if let Err(e) = self.meter_provider.shutdown() {
			warn!(error = %e, "Failed to shut down meter provider");
		}
	}
}

/// Initialize OpenTelemetry with OTLP exporters and the tracing subscriber
///
/// # Errors
/// Returns an error when an exporter cannot be built.
pub fn init_observability(service_name: &str, otlp_endpoint: &str, log_json: bool) -> Result<(Telemetry, TranscriberMetrics)> {
	let resource = Resource::builder()
		.with_service_name(service_name.to_string())
		.with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
		.build();

	// Tracing (spans)
	let span_exporter = SpanExporter::builder()
		.with_tonic()
		.with_endpoint(otlp_endpoint.to_string())
		.build()
		.map_err(|e| anyhow::anyhow!("Failed to initialize span exporter: {}", e))?;

	let tracer_provider = SdkTracerProvider::builder()
		.with_batch_exporter(span_exporter)
		.with_sampler(Sampler::AlwaysOn)
		.with_id_generator(RandomIdGenerator::default())
		.with_resource(resource.clone())
		.build();
	global::set_tracer_provider(tracer_provider.clone());
	let tracer = tracer_provider.tracer("recording-transcriber");

	// Metrics
	let metric_exporter = MetricExporter::builder()
		.with_tonic()
		.with_endpoint(otlp_endpoint.to_string())
		.build()
		.map_err(|e| anyhow::anyhow!("Failed to initialize metric exporter: {}", e))?;

	let reader = PeriodicReader::builder(metric_exporter).with_interval(Duration::from_secs(10)).build();
	let meter_provider = SdkMeterProvider::builder().with_reader(reader).with_resource(resource).build();
	global::set_meter_provider(meter_provider.clone());

	let metrics = TranscriberMetrics::new(&global::meter("recording-transcriber"));

	tracing_subscriber::registry()
		.with(env_filter())
		.with(tracing_opentelemetry::layer().with_tracer(tracer))
		.with(fmt_layer(log_json))
		.init();

	info!(service = service_name, otlp_endpoint, "✅ OpenTelemetry initialized");

	Ok((Telemetry { tracer_provider, meter_provider }, metrics))
}

/// Local-only logging and metrics, used when no OTLP endpoint is configured
/// or the exporters fail to start.
pub fn init_local(log_json: bool) -> TranscriberMetrics {
	tracing_subscriber::registry().with(env_filter()).with(fmt_layer(log_json)).init();

	TranscriberMetrics::local()
}

/// Flattened JSON events when `log_json` is set, human-readable lines otherwise
fn fmt_layer<S>(log_json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
	S: Subscriber + for<'a> LookupSpan<'a>,
{
	if log_json {
		Box::new(
			tracing_subscriber::fmt::layer()
				.fmt_fields(JsonFields::default())
				.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false)),
		)
	} else {
		Box::new(tracing_subscriber::fmt::layer().with_target(true))
	}
}

fn env_filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
