use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use recording_transcriber::config::Config;
use recording_transcriber::http::{self, AppState};
use recording_transcriber::observability::{self, Telemetry, TranscriberMetrics};
use recording_transcriber::{EngineAdapter, MemoryRecordingStore, TranscriptionService};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.validate().map_err(anyhow::Error::msg)?;

	let (telemetry, metrics) = init_observability_with_fallback(&config);

	info!(
		service = %config.service_name,
		engine = %config.engine_path.display(),
		model = %config.model_name,
		"🎯 Starting transcription service"
	);

	let recordings = Arc::new(MemoryRecordingStore::new());
	let adapter = Arc::new(EngineAdapter::new(config.engine_config(), recordings.clone(), metrics.clone()));
	let service = Arc::new(TranscriptionService::new(adapter, recordings.clone(), config.worker_config(), metrics));
	service.register_gauges();

	// Transcription is a degradable feature: keep serving when the engine is missing
	if let Err(e) = service.worker_start().await {
		error!(error = %e, "❌ Transcription worker unavailable, continuing without it");
	}

	let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
	info!(addr = %config.listen_addr, "🌐 Listening");

	let app = http::router(AppState {
		service: Arc::clone(&service),
		recordings,
	});
	axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal()).await?;

	info!("🛑 Shutdown signal received");
	service.worker_shutdown(SHUTDOWN_GRACE_PERIOD).await;

	if let Some(telemetry) = telemetry {
		telemetry.shutdown();
	}

	info!("✅ Exiting");
	Ok(())
}

fn init_observability_with_fallback(config: &Config) -> (Option<Telemetry>, TranscriberMetrics) {
	let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
		let metrics = observability::init_local(config.log_json);
		info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, metrics stay local");
		return (None, metrics);
	};

	match observability::init_observability(&config.service_name, &endpoint, config.log_json) {
		Ok((telemetry, metrics)) => (Some(telemetry), metrics),
		Err(e) => {
			let metrics = observability::init_local(config.log_json);
			warn!(
				error = %e,
				"⚠️ OTLP observability failed to initialize, falling back to local metrics only"
			);
			(None, metrics)
		}
	}
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
