use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, TranscriptionError};
use crate::job::RecordingId;

/// What a finished engine run left behind
#[derive(Debug)]
pub struct EngineRun {
	pub status: ExitStatus,
	pub stdout: String,
	pub elapsed: Duration,
}

/// Run the engine once, capturing stdout and streaming stderr into the log.
///
/// The timeout starts at spawn and covers both process exit and stdout EOF.
/// When it fires the child is killed outright and any buffered output is
/// discarded.
pub async fn run_with_timeout(mut command: Command, timeout: Duration, recording_id: &RecordingId) -> Result<EngineRun> {
	command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

	let started = Instant::now();
	let mut child = command.spawn().map_err(TranscriptionError::SpawnFailure)?;
	debug!(%recording_id, pid = child.id(), "🚀 Engine process spawned");

	let stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("engine stdout was not captured"))?;
	let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr, recording_id.clone())));

	let outcome = tokio::time::timeout(timeout, async {
		let (status, output) = tokio::join!(child.wait(), read_to_end_lossy(stdout));
		Ok::<_, std::io::Error>((status?, output?))
	})
	.await;

	match outcome {
		Ok(Ok((status, stdout))) => Ok(EngineRun {
			status,
			stdout,
			elapsed: started.elapsed(),
		}),
		Ok(Err(e)) => {
			if let Some(task) = stderr_task {
				task.abort();
			}
			Err(TranscriptionError::Io(e))
		}
		Err(_) => {
			warn!(%recording_id, timeout_ms = timeout.as_millis(), "⏱️ Engine timed out, killing process");
			if let Err(e) = child.kill().await {
				warn!(%recording_id, error = %e, "Failed to kill timed out engine process");
			}
			if let Some(task) = stderr_task {
				task.abort();
			}
			Err(TranscriptionError::TranscriptionTimeout(timeout))
		}
	}
}

/// Run a short command and require a zero exit status within `timeout`.
pub async fn run_probe(program: &Path, args: &[&str], timeout: Duration) -> std::result::Result<(), String> {
	let mut command = Command::new(program);
	command.args(args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped()).kill_on_drop(true);

	let child = command.spawn().map_err(|e| format!("failed to run {}: {e}", program.display()))?;

	match tokio::time::timeout(timeout, child.wait_with_output()).await {
		Err(_) => Err(format!("command timed out: {} {}", program.display(), args.join(" "))),
		Ok(Err(e)) => Err(format!("failed to wait for {}: {e}", program.display())),
		Ok(Ok(output)) if output.status.success() => Ok(()),
		Ok(Ok(output)) => Err(format!("command failed with {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim())),
	}
}

/// Find an executable the way a shell would: paths are taken as is, bare
/// names are looked up on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
	if program.is_absolute() || program.components().count() > 1 {
		return program.is_file().then(|| program.to_path_buf());
	}

	let paths = std::env::var_os("PATH")?;
	std::env::split_paths(&paths).map(|dir| dir.join(program)).find(|candidate| candidate.is_file())
}

async fn read_to_end_lossy<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
	let mut buf = Vec::new();
	reader.read_to_end(&mut buf).await?;
	Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn forward_stderr(stderr: ChildStderr, recording_id: RecordingId) {
	let mut lines = BufReader::new(stderr).lines();
	loop {
		match lines.next_line().await {
			Ok(Some(line)) => {
				let line = line.trim();
				if !line.is_empty() {
					info!(target: "recording_transcriber::engine", %recording_id, "🔊 {}", line);
				}
			}
			Ok(None) => break,
			Err(e) => {
				debug!(%recording_id, error = %e, "Engine stderr closed");
				break;
			}
		}
	}
}
