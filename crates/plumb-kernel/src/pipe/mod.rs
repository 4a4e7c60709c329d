//! Named message pipes with fan-out delivery.
//!
//! ```text
//!   PipeWriter ─┐                         ┌──▶ reader queue ──▶ PipeReader
//!   PipeWriter ─┼──▶ Pipe::write ──mode──▶├──▶ [via] ──▶ reader queue ──▶ PipeReader
//!   write()   ──┘    count/last/log       └──▶ reader queue ──▶ PipeReader
//! ```
//!
//! A write never blocks. Each reader owns a bounded queue; when a queue is
//! full the new message is dropped for that reader and a warning is logged.
//! Delivery to one reader never depends on another reader's progress.
//!
//! State lives behind a `std::sync::Mutex`. Critical sections are queue
//! pushes and bookkeeping, and the lock is never held across an await.
//! Handles detach synchronously in `Drop`.

mod handle;

pub use handle::{PipeReader, PipeWriter};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use plumb_types::{DEFAULT_MAX_LINE, PipeMode, PipeStatus, PlumbError, PlumbResult};

use crate::sink::{LogSink, TracingLogSink};
use crate::via::{Feed, ViaProcess};

/// Identifier of an attached reader or writer, unique within a pipe.
pub type HandleId = u64;

/// Default capacity of each reader's queue.
pub const DEFAULT_READER_QUEUE: usize = 1024;

/// Per-pipe delivery limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeSettings {
    /// Messages buffered per reader (and per via input) before drops begin.
    pub reader_queue: usize,
    /// Longest line read back from a via or program stage.
    pub max_line: usize,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            reader_queue: DEFAULT_READER_QUEUE,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

enum ViaSlot {
    /// No process yet; one is started on the next delivery.
    Idle,
    Running(ViaProcess),
    /// Start failed or the process exited. Deliveries are dropped until the
    /// via is set again.
    Failed,
}

struct ReaderSlot {
    id: HandleId,
    tx: mpsc::Sender<String>,
    via: ViaSlot,
}

struct PipeState {
    mode: PipeMode,
    log: bool,
    via: Vec<String>,
    readers: Vec<ReaderSlot>,
    writers: BTreeSet<HandleId>,
    count: u64,
    last: String,
    /// Next round-robin position in `readers`.
    cursor: usize,
    deleted: bool,
}

/// A named pipe.
///
/// Obtained from [`Registry`](crate::Registry); shared as `Arc<Pipe>`.
pub struct Pipe {
    name: String,
    state: Mutex<PipeState>,
    next_handle: AtomicU64,
    closed: CancellationToken,
    settings: PipeSettings,
    log_sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipe {
    pub(crate) fn new(name: impl Into<String>, settings: PipeSettings, log_sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PipeState {
                mode: PipeMode::All,
                log: false,
                via: Vec::new(),
                readers: Vec::new(),
                writers: BTreeSet::new(),
                count: 0,
                last: String::new(),
                cursor: 0,
                deleted: false,
            }),
            next_handle: AtomicU64::new(1),
            closed: CancellationToken::new(),
            settings,
            log_sink,
        }
    }

    /// A standalone pipe outside any registry, logging through `tracing`.
    pub fn detached(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name, PipeSettings::default(), Arc::new(TracingLogSink)))
    }

    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> HandleId {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> PipeSettings {
        self.settings
    }

    /// Write one message.
    ///
    /// Counts the message, records it as the last message, hands it to
    /// readers according to the mode, then logs it if logging is enabled.
    /// Returns `Closed` once the pipe has been deleted.
    pub fn write(&self, message: &str) -> PlumbResult<()> {
        let log = {
            let mut state = self.lock();
            if state.deleted {
                return Err(PlumbError::Closed(self.name.clone()));
            }
            state.count += 1;
            state.last.clear();
            state.last.push_str(message);
            self.dispatch(&mut state, message);
            state.log
        };

        if log {
            self.log_sink.record(&self.name, message);
        }
        Ok(())
    }

    fn dispatch(&self, state: &mut PipeState, message: &str) {
        if state.readers.is_empty() {
            return;
        }

        let mut gone = Vec::new();
        match state.mode {
            PipeMode::All => {
                for slot in state.readers.iter_mut() {
                    if !self.deliver(slot, &state.via, message) {
                        gone.push(slot.id);
                    }
                }
            }
            PipeMode::RoundRobin => {
                if state.cursor >= state.readers.len() {
                    state.cursor = 0;
                }
                let idx = state.cursor;
                state.cursor = (idx + 1) % state.readers.len();
                let slot = &mut state.readers[idx];
                if !self.deliver(slot, &state.via, message) {
                    gone.push(slot.id);
                }
            }
            PipeMode::Random => {
                let idx = rand::thread_rng().gen_range(0..state.readers.len());
                let slot = &mut state.readers[idx];
                if !self.deliver(slot, &state.via, message) {
                    gone.push(slot.id);
                }
            }
        }

        for id in gone {
            tracing::warn!(pipe = %self.name, reader = id, "reader went away, detached");
            remove_reader(state, id);
        }
    }

    /// Hand a message to one reader. Returns false if the reader is gone.
    fn deliver(&self, slot: &mut ReaderSlot, via: &[String], message: &str) -> bool {
        if via.is_empty() {
            return match slot.tx.try_send(message.to_string()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(pipe = %self.name, reader = slot.id, "reader queue full, message dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            };
        }

        if slot.tx.is_closed() {
            return false;
        }

        if matches!(slot.via, ViaSlot::Idle) {
            slot.via = match ViaProcess::start(
                &self.name,
                slot.id,
                via,
                slot.tx.clone(),
                &self.settings,
                self.closed.child_token(),
            ) {
                Ok(process) => ViaSlot::Running(process),
                Err(e) => {
                    tracing::warn!(pipe = %self.name, reader = slot.id, "via failed to start: {e}");
                    ViaSlot::Failed
                }
            };
        }

        let ViaSlot::Running(process) = &slot.via else {
            tracing::debug!(pipe = %self.name, reader = slot.id, "via unavailable, message dropped");
            return true;
        };
        match process.feed(message) {
            Feed::Queued => {}
            Feed::Dropped => {
                tracing::warn!(pipe = %self.name, reader = slot.id, "via queue full, message dropped");
            }
            Feed::Exited => slot.via = ViaSlot::Failed,
        }
        true
    }

    /// Attach a new reader. Its queue starts empty.
    pub fn attach_reader(self: &Arc<Self>) -> PlumbResult<PipeReader> {
        let (tx, rx) = mpsc::channel(self.settings.reader_queue.max(1));
        let id = self.next_id();
        {
            let mut state = self.lock();
            if state.deleted {
                return Err(PlumbError::Closed(self.name.clone()));
            }
            state.readers.push(ReaderSlot {
                id,
                tx,
                via: ViaSlot::Idle,
            });
        }
        tracing::debug!(pipe = %self.name, reader = id, "reader attached");
        Ok(PipeReader::new(id, Arc::clone(self), rx))
    }

    /// Attach a new writer.
    pub fn attach_writer(self: &Arc<Self>) -> PlumbResult<PipeWriter> {
        let id = self.next_id();
        {
            let mut state = self.lock();
            if state.deleted {
                return Err(PlumbError::Closed(self.name.clone()));
            }
            state.writers.insert(id);
        }
        tracing::debug!(pipe = %self.name, writer = id, "writer attached");
        Ok(PipeWriter::new(id, Arc::clone(self)))
    }

    /// Remove a reader. Its via, if any, is killed. Unknown ids are ignored.
    pub fn detach_reader(&self, id: HandleId) {
        let slot = remove_reader(&mut self.lock(), id);
        if slot.is_some() {
            tracing::debug!(pipe = %self.name, reader = id, "reader detached");
        }
    }

    pub fn detach_writer(&self, id: HandleId) {
        if self.lock().writers.remove(&id) {
            tracing::debug!(pipe = %self.name, writer = id, "writer detached");
        }
    }

    pub fn set_mode(&self, mode: PipeMode) {
        let mut state = self.lock();
        state.mode = mode;
    }

    /// Replace the via command; an empty command clears it.
    ///
    /// Every reader's current via process is killed. New ones start on the
    /// next delivery.
    pub fn set_via(&self, command: Vec<String>) {
        let mut state = self.lock();
        state.via = command;
        for slot in state.readers.iter_mut() {
            slot.via = ViaSlot::Idle;
        }
    }

    pub fn set_log(&self, enabled: bool) {
        self.lock().log = enabled;
    }

    pub fn mode(&self) -> PipeMode {
        self.lock().mode
    }

    pub fn via(&self) -> Vec<String> {
        self.lock().via.clone()
    }

    pub fn log_enabled(&self) -> bool {
        self.lock().log
    }

    pub fn num_readers(&self) -> usize {
        self.lock().readers.len()
    }

    pub fn num_writers(&self) -> usize {
        self.lock().writers.len()
    }

    /// Total messages written since creation.
    pub fn num_messages(&self) -> u64 {
        self.lock().count
    }

    pub fn last(&self) -> String {
        self.lock().last.clone()
    }

    /// True if any reader or writer is attached.
    pub fn is_attached(&self) -> bool {
        let state = self.lock();
        !state.readers.is_empty() || !state.writers.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.lock().deleted
    }

    /// Snapshot of the pipe, taken under one lock acquisition.
    pub fn status(&self) -> PipeStatus {
        let state = self.lock();
        PipeStatus {
            name: self.name.clone(),
            mode: state.mode,
            readers: state.readers.len(),
            writers: state.writers.len(),
            count: state.count,
            via: state.via.clone(),
            last: state.last.clone(),
        }
    }

    /// Resolves once the pipe has been deleted.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub(crate) fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the pipe deleted and release every attachment.
    ///
    /// Readers see end-of-stream after draining their queues; writers get
    /// `Closed` on their next send. Via processes are killed.
    pub(crate) fn close(&self) {
        let readers = {
            let mut state = self.lock();
            state.deleted = true;
            state.writers.clear();
            state.cursor = 0;
            std::mem::take(&mut state.readers)
        };
        self.closed.cancel();
        drop(readers);
        tracing::debug!(pipe = %self.name, "pipe closed");
    }

    /// Close the pipe only if nothing is attached. The check and the
    /// deleted mark happen under one lock, so no attach slips in between.
    pub(crate) fn close_if_unattached(&self) -> bool {
        {
            let mut state = self.lock();
            if state.deleted || !state.readers.is_empty() || !state.writers.is_empty() {
                return false;
            }
            state.deleted = true;
            state.cursor = 0;
        }
        self.closed.cancel();
        tracing::debug!(pipe = %self.name, "pipe closed");
        true
    }
}

fn remove_reader(state: &mut PipeState, id: HandleId) -> Option<ReaderSlot> {
    let idx = state.readers.iter().position(|r| r.id == id)?;
    if idx < state.cursor {
        state.cursor -= 1;
    }
    Some(state.readers.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryLogSink;
    use rstest::rstest;
    use std::time::Duration;

    fn pipe_with_queue(queue: usize) -> Arc<Pipe> {
        Arc::new(Pipe::new(
            "test//p",
            PipeSettings {
                reader_queue: queue,
                max_line: DEFAULT_MAX_LINE,
            },
            Arc::new(TracingLogSink),
        ))
    }

    fn drain(reader: &mut PipeReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = reader.try_recv() {
            out.push(msg);
        }
        out
    }

    // ========================================================================
    // Delivery modes
    // ========================================================================

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(5)]
    fn all_mode_reaches_every_reader(#[case] n: usize) {
        let pipe = Pipe::detached("test//all");
        let mut readers: Vec<_> = (0..n).map(|_| pipe.attach_reader().unwrap()).collect();

        pipe.write("one").unwrap();
        pipe.write("two").unwrap();

        for reader in readers.iter_mut() {
            assert_eq!(drain(reader), vec!["one", "two"]);
        }
        assert_eq!(pipe.num_messages(), 2);
        assert_eq!(pipe.last(), "two");
    }

    #[test]
    fn round_robin_rotates_fairly() {
        let pipe = Pipe::detached("test//rr");
        pipe.set_mode(PipeMode::RoundRobin);
        let mut readers: Vec<_> = (0..3).map(|_| pipe.attach_reader().unwrap()).collect();

        for i in 0..9 {
            pipe.write(&i.to_string()).unwrap();
        }

        assert_eq!(drain(&mut readers[0]), vec!["0", "3", "6"]);
        assert_eq!(drain(&mut readers[1]), vec!["1", "4", "7"]);
        assert_eq!(drain(&mut readers[2]), vec!["2", "5", "8"]);
    }

    #[test]
    fn round_robin_cursor_survives_mode_reassert() {
        let pipe = Pipe::detached("test//rr");
        pipe.set_mode(PipeMode::RoundRobin);
        let mut readers: Vec<_> = (0..3).map(|_| pipe.attach_reader().unwrap()).collect();

        pipe.write("a").unwrap();
        pipe.set_mode(PipeMode::RoundRobin);
        pipe.write("b").unwrap();

        assert_eq!(drain(&mut readers[0]), vec!["a"]);
        assert_eq!(drain(&mut readers[1]), vec!["b"]);
        assert!(drain(&mut readers[2]).is_empty());
    }

    #[test]
    fn round_robin_survives_detach_before_cursor() {
        let pipe = Pipe::detached("test//rr");
        pipe.set_mode(PipeMode::RoundRobin);
        let first = pipe.attach_reader().unwrap();
        let mut second = pipe.attach_reader().unwrap();
        let mut third = pipe.attach_reader().unwrap();

        pipe.write("a").unwrap(); // first
        pipe.write("b").unwrap(); // second
        drop(first);
        pipe.write("c").unwrap(); // third
        pipe.write("d").unwrap(); // second

        assert_eq!(drain(&mut second), vec!["b", "d"]);
        assert_eq!(drain(&mut third), vec!["c"]);
    }

    #[test]
    fn random_mode_spreads_evenly() {
        let pipe = pipe_with_queue(20_000);
        pipe.set_mode(PipeMode::Random);
        let mut readers: Vec<_> = (0..4).map(|_| pipe.attach_reader().unwrap()).collect();

        for i in 0..10_000 {
            pipe.write(&i.to_string()).unwrap();
        }

        let counts: Vec<usize> = readers.iter_mut().map(|r| drain(r).len()).collect();
        assert_eq!(counts.iter().sum::<usize>(), 10_000);
        for count in counts {
            assert!((2200..=2800).contains(&count), "uneven spread: {count}");
        }
    }

    #[rstest]
    #[case(PipeMode::RoundRobin)]
    #[case(PipeMode::Random)]
    fn single_target_modes_with_no_readers_only_count(#[case] mode: PipeMode) {
        let pipe = Pipe::detached("test//none");
        pipe.set_mode(mode);
        pipe.write("lost").unwrap();
        assert_eq!(pipe.num_messages(), 1);
        assert_eq!(pipe.last(), "lost");
    }

    // ========================================================================
    // Attachments and lifecycle
    // ========================================================================

    #[test]
    fn full_queue_drops_newest_without_blocking() {
        let pipe = pipe_with_queue(2);
        let mut slow = pipe.attach_reader().unwrap();
        let mut fast = pipe.attach_reader().unwrap();

        for msg in ["a", "b", "c"] {
            pipe.write(msg).unwrap();
            if msg != "c" {
                assert_eq!(fast.try_recv().as_deref(), Some(msg));
            }
        }

        assert_eq!(drain(&mut slow), vec!["a", "b"]);
        assert_eq!(drain(&mut fast), vec!["c"]);
        assert_eq!(pipe.num_messages(), 3);
    }

    #[test]
    fn dropping_handles_detaches() {
        let pipe = Pipe::detached("test//h");
        let reader = pipe.attach_reader().unwrap();
        let writer = pipe.attach_writer().unwrap();
        assert_eq!((pipe.num_readers(), pipe.num_writers()), (1, 1));
        assert!(pipe.is_attached());

        drop(reader);
        writer.detach();
        assert_eq!((pipe.num_readers(), pipe.num_writers()), (0, 0));
        assert!(!pipe.is_attached());
    }

    #[tokio::test]
    async fn close_ends_readers_and_rejects_writes() {
        let pipe = Pipe::detached("test//c");
        let mut reader = pipe.attach_reader().unwrap();
        let writer = pipe.attach_writer().unwrap();

        writer.send("before").unwrap();
        pipe.close();

        assert_eq!(reader.recv().await.as_deref(), Some("before"));
        assert_eq!(reader.recv().await, None);
        assert!(matches!(writer.send("after"), Err(PlumbError::Closed(_))));
        assert!(matches!(pipe.attach_reader(), Err(PlumbError::Closed(_))));
        tokio::time::timeout(Duration::from_secs(1), writer.closed())
            .await
            .unwrap();
        assert_eq!(pipe.num_writers(), 0);
    }

    #[test]
    fn logging_goes_to_sink_when_enabled() {
        let sink = Arc::new(MemoryLogSink::new());
        let pipe = Pipe::new("test//log", PipeSettings::default(), sink.clone());

        pipe.write("quiet").unwrap();
        pipe.set_log(true);
        pipe.write("loud").unwrap();

        assert_eq!(sink.entries(), vec![("test//log".to_string(), "loud".to_string())]);
    }

    #[test]
    fn status_reflects_state() {
        let pipe = Pipe::detached("test//s");
        pipe.set_mode(PipeMode::RoundRobin);
        pipe.set_via(vec!["cat".into()]);
        let _w = pipe.attach_writer().unwrap();
        pipe.write(" hi\n").unwrap();

        let status = pipe.status();
        assert_eq!(status.name, "test//s");
        assert_eq!(status.mode, PipeMode::RoundRobin);
        assert_eq!((status.readers, status.writers, status.count), (0, 1, 1));
        assert_eq!(status.via, vec!["cat"]);
        assert_eq!(status.last, " hi\n");
    }

    // ========================================================================
    // Vias
    // ========================================================================

    #[tokio::test]
    async fn via_transforms_per_reader() {
        let pipe = Pipe::detached("test//via");
        pipe.set_via(vec!["cat".into()]);
        let mut a = pipe.attach_reader().unwrap();
        let mut b = pipe.attach_reader().unwrap();

        for msg in ["x", "y", "z"] {
            pipe.write(msg).unwrap();
        }

        for reader in [&mut a, &mut b] {
            let mut got = Vec::new();
            for _ in 0..3 {
                let msg = tokio::time::timeout(Duration::from_secs(5), reader.recv())
                    .await
                    .unwrap()
                    .unwrap();
                got.push(msg);
            }
            assert_eq!(got, vec!["x", "y", "z"]);
        }
    }

    #[tokio::test]
    async fn first_via_write_does_not_wait_for_processes() {
        let pipe = Pipe::detached("test//fanvia");
        pipe.set_via(vec!["cat".into()]);
        let mut readers: Vec<_> = (0..100).map(|_| pipe.attach_reader().unwrap()).collect();

        let started = std::time::Instant::now();
        pipe.write("first").unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(50), "first write took {elapsed:?}");

        for reader in readers.iter_mut() {
            let msg = tokio::time::timeout(Duration::from_secs(10), reader.recv())
                .await
                .expect("timed out");
            assert_eq!(msg.as_deref(), Some("first"));
        }
    }

    #[tokio::test]
    async fn failed_via_drops_until_reset() {
        let pipe = Pipe::detached("test//badvia");
        pipe.set_via(vec!["/nonexistent/plumb/via".into()]);
        let mut reader = pipe.attach_reader().unwrap();

        pipe.write("lost").unwrap();
        // the launch fails in the background; the next write finds it gone
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipe.write("also lost").unwrap();
        assert_eq!(pipe.num_messages(), 2);
        assert!(reader.try_recv().is_none());

        pipe.set_via(Vec::new());
        pipe.write("direct").unwrap();
        assert_eq!(reader.try_recv().as_deref(), Some("direct"));
    }
}
