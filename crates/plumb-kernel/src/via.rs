//! Via supervisor: one transform process per (pipe, reader) pair.
//!
//! ```text
//!   Pipe::write ──try_send──▶ [input queue] ──feed──▶ child stdin
//!                                                      │
//!   reader queue ◀──forward── child stdout lines ◀─────┘
//! ```
//!
//! [`ViaProcess::start`] only creates the input queue and spawns a launch
//! task, so it is safe to call with the pipe lock held. The launch task
//! starts the child and then runs three tasks: `feed` writes queued
//! messages to the child's stdin, `forward` hands every stdout line to the
//! owning reader's queue, and `supervise` waits for the child or kills it
//! on cancellation. Dropping a [`ViaProcess`] cancels all of them.

use std::io;
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use plumb_types::{PlumbError, PlumbResult};

use crate::pipe::{HandleId, PipeSettings};

/// What happened to a message handed to a via.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    Queued,
    /// Input queue full; the message was dropped.
    Dropped,
    /// The process is gone or never started; nothing more will be
    /// delivered through it.
    Exited,
}

/// A transform process serving exactly one reader.
#[derive(Debug)]
pub struct ViaProcess {
    input: mpsc::Sender<String>,
    cancel: CancellationToken,
}

/// Everything the launch task needs, owned.
struct Launch {
    pipe: String,
    reader: HandleId,
    program: String,
    args: Vec<String>,
    output: mpsc::Sender<String>,
    max_line: usize,
    cancel: CancellationToken,
}

impl ViaProcess {
    /// Start `command` in the background and wire its stdout to `output`.
    ///
    /// Returns without waiting for the process. Messages fed before the
    /// child is up wait in the input queue. If the child cannot be started
    /// the queue closes and the next [`feed`](Self::feed) reports
    /// [`Feed::Exited`].
    ///
    /// `cancel` should be a child of the pipe's close token so that deleting
    /// the pipe tears the process down.
    pub(crate) fn start(
        pipe: &str,
        reader: HandleId,
        command: &[String],
        output: mpsc::Sender<String>,
        settings: &PipeSettings,
        cancel: CancellationToken,
    ) -> PlumbResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PlumbError::invalid("empty via command"))?;

        // writes may come from plain threads; the process needs a reactor
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PlumbError::Spawn(format!("{program}: no async runtime")))?;

        let (input, rx) = mpsc::channel(settings.reader_queue.max(1));
        runtime.spawn(launch(
            Launch {
                pipe: pipe.to_string(),
                reader,
                program: program.clone(),
                args: args.to_vec(),
                output,
                max_line: settings.max_line,
                cancel: cancel.clone(),
            },
            rx,
        ));

        Ok(Self { input, cancel })
    }

    /// Queue one message for the process without waiting.
    pub(crate) fn feed(&self, message: &str) -> Feed {
        match self.input.try_send(message.to_string()) {
            Ok(()) => Feed::Queued,
            Err(TrySendError::Full(_)) => Feed::Dropped,
            Err(TrySendError::Closed(_)) => Feed::Exited,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.input.is_closed() && !self.cancel.is_cancelled()
    }
}

impl Drop for ViaProcess {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start the child, then supervise it. Returning early drops `rx`, which
/// the owning [`ViaProcess`] sees as [`Feed::Exited`].
async fn launch(via: Launch, rx: mpsc::Receiver<String>) {
    let Launch { pipe, reader, program, args, output, max_line, cancel } = via;
    if cancel.is_cancelled() {
        return;
    }

    let spawned = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(%pipe, reader, %program, "via failed to start: {e}");
            return;
        }
    };

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        tracing::warn!(%pipe, reader, %program, "via stdio not captured");
        return;
    };

    tracing::debug!(%pipe, reader, %program, pid = child.id(), "via started");

    let exited = CancellationToken::new();
    tokio::spawn(feed(stdin, rx, cancel.clone(), exited.clone()));
    tokio::spawn(forward(stdout, output, max_line, cancel.clone(), pipe.clone(), reader));
    supervise(child, cancel, exited, pipe, reader, program).await;
}

/// Write one message as a newline-terminated line and flush.
pub(crate) async fn write_line<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message.as_bytes()).await?;
    if !message.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}

async fn feed(
    mut stdin: ChildStdin,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    exited: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = exited.cancelled() => break,
            message = rx.recv() => match message {
                Some(m) => m,
                None => break,
            },
        };

        if let Err(e) = write_line(&mut stdin, &message).await {
            tracing::debug!("via stdin closed: {e}");
            break;
        }
    }
}

async fn forward(
    stdout: ChildStdout,
    output: mpsc::Sender<String>,
    max_line: usize,
    cancel: CancellationToken,
    pipe: String,
    reader: HandleId,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(max_line));

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next() => line,
        };

        match line {
            Some(Ok(line)) => match output.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%pipe, reader, "reader queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(%pipe, reader, max_line, "via output line too long, dropped");
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(%pipe, reader, "via output failed: {e}");
                break;
            }
            None => break,
        }
    }
}

async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    exited: CancellationToken,
    pipe: String,
    reader: HandleId,
    program: String,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::debug!(%pipe, reader, %program, "via kill: {e}");
            }
        }
        status = child.wait() => {
            match status {
                Ok(status) => tracing::warn!(
                    %pipe, reader, %program, %status,
                    "via exited, delivery to this reader stopped"
                ),
                Err(e) => tracing::warn!(%pipe, reader, %program, "via wait failed: {e}"),
            }
            exited.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_via_echoes_lines_through_cat() {
        let (tx, mut rx) = mpsc::channel(16);
        let via = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["cat"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(via.feed("hello"), Feed::Queued);
        assert_eq!(via.feed("world\n"), Feed::Queued);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("hello"));
        assert_eq!(second.as_deref(), Some("world"));
    }

    async fn wait_until_stopped(via: &ViaProcess) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while via.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_as_exited() {
        let (tx, mut rx) = mpsc::channel(1);
        let via = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["/nonexistent/via/program"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();

        wait_until_stopped(&via).await;
        assert!(!via.is_running());
        assert_eq!(via.feed("lost"), Feed::Exited);
        let end = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn test_start_outside_runtime_is_spawn_error() {
        let (tx, _rx) = mpsc::channel(1);
        let err = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["cat"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PlumbError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_slow_reader_drops_newest_output() {
        let (tx, mut rx) = mpsc::channel(1);
        let via = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["cat"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();

        // the reader queue holds one line; the rest overflow while nobody reads
        for msg in ["a", "b", "c"] {
            assert_eq!(via.feed(msg), Feed::Queued);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(via.is_running());

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("a"));

        // the via kept reading its stdout, so the next line is fresh
        assert_eq!(via.feed("d"), Feed::Queued);
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(next.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_empty_command_is_invalid() {
        let (tx, _rx) = mpsc::channel(1);
        let err = ViaProcess::start(
            "t//p",
            1,
            &[],
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PlumbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_drop_closes_output() {
        let (tx, mut rx) = mpsc::channel(16);
        let via = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["cat"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();
        drop(via);

        // forward task owns the only sender; cancellation ends it
        let end = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_exit_marks_via_exited() {
        let (tx, _rx) = mpsc::channel(16);
        let via = ViaProcess::start(
            "t//p",
            1,
            &cmd(&["true"]),
            tx,
            &PipeSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();

        wait_until_stopped(&via).await;
        assert!(!via.is_running());
        assert_eq!(via.feed("late"), Feed::Exited);
    }
}
