//! Program stages and the tasks that move lines between links.
//!
//! Every task selects on a cancellation token so tearing down a pipeline
//! never waits on a blocked read. Handles are moved into the tasks, so a
//! finished task has already detached from its pipes.

use std::path::Path;
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use plumb_types::{PlumbError, PlumbResult};

use crate::pipe::{PipeReader, PipeWriter};
use crate::via::write_line;

/// Start a program stage. stdin/stdout are piped only when a neighbour
/// needs them; stderr is always captured for logging.
pub(super) fn spawn_program(
    path: &Path,
    argv: &[String],
    has_input: bool,
    has_output: bool,
) -> PlumbResult<Child> {
    let piped_or_null = |piped: bool| if piped { Stdio::piped() } else { Stdio::null() };

    Command::new(path)
        .args(argv.iter().skip(1))
        .stdin(piped_or_null(has_input))
        .stdout(piped_or_null(has_output))
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PlumbError::Spawn(format!("{}: {e}", path.display())))
}

/// Pipe → pipe link.
pub(super) async fn forward(mut reader: PipeReader, writer: PipeWriter, cancel: CancellationToken) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = writer.closed() => break,
            message = reader.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        if writer.send(&message).is_err() {
            break;
        }
    }
}

/// Pipe → program stdin. Deleting the source pipe stops the stage.
pub(super) async fn feed(
    mut reader: PipeReader,
    mut stdin: ChildStdin,
    stage: CancellationToken,
    program: String,
) {
    loop {
        let message = tokio::select! {
            _ = stage.cancelled() => break,
            message = reader.recv() => message,
        };
        let Some(message) = message else {
            tracing::debug!(%program, pipe = reader.pipe().name(), "source pipe deleted, stopping stage");
            stage.cancel();
            break;
        };

        tokio::select! {
            _ = stage.cancelled() => break,
            written = write_line(&mut stdin, &message) => if let Err(e) = written {
                tracing::debug!(%program, "stage stdin closed: {e}");
                break;
            },
        }
    }
}

/// Program stdout → pipe. Runs until the program closes stdout so output
/// produced just before exit is not lost.
pub(super) async fn drain(
    stdout: ChildStdout,
    writer: PipeWriter,
    pipeline: CancellationToken,
    stage: CancellationToken,
    max_line: usize,
    program: String,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(max_line));

    loop {
        let line = tokio::select! {
            _ = pipeline.cancelled() => break,
            _ = writer.closed() => {
                tracing::debug!(%program, pipe = writer.pipe().name(), "destination pipe deleted, stopping stage");
                stage.cancel();
                break;
            }
            line = lines.next() => line,
        };

        match line {
            Some(Ok(line)) => {
                if writer.send(&line).is_err() {
                    stage.cancel();
                    break;
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(%program, max_line, "stage output line too long, dropped");
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(%program, "stage output failed: {e}");
                break;
            }
            None => break,
        }
    }
}

/// Program stdout → next program stdin.
pub(super) async fn link(mut stdout: ChildStdout, mut stdin: ChildStdin, pipeline: CancellationToken) {
    tokio::select! {
        _ = pipeline.cancelled() => {}
        copied = tokio::io::copy(&mut stdout, &mut stdin) => if let Err(e) = copied {
            tracing::debug!("stage link closed: {e}");
        },
    }
}

/// Log each stderr line of a stage at debug level.
pub(super) async fn log_stderr<R>(stderr: R, program: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(stderr, LinesCodec::new());
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => tracing::debug!(%program, "stderr: {line}"),
            Err(_) => break,
        }
    }
}

/// Wait for the program, or kill it when the stage is cancelled.
pub(super) async fn supervise(mut child: Child, stage: CancellationToken, program: String) {
    tokio::select! {
        _ = stage.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::debug!(%program, "kill failed: {e}");
            }
            tracing::debug!(%program, "stage stopped");
        }
        status = child.wait() => {
            match status {
                Ok(status) if status.success() => tracing::info!(%program, "stage exited"),
                Ok(status) => tracing::warn!(%program, %status, "stage exited with failure"),
                Err(e) => tracing::warn!(%program, "stage wait failed: {e}"),
            }
            stage.cancel();
        }
    }
}
