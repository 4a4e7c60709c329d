//! Reader and writer handles.
//!
//! Dropping a handle detaches it synchronously, so a task that panics or is
//! aborted never leaves a stale attachment behind.

use std::sync::Arc;

use tokio::sync::mpsc;

use plumb_types::PlumbResult;

use super::{HandleId, Pipe};

/// Receiving end of a pipe attachment.
#[derive(Debug)]
pub struct PipeReader {
    id: HandleId,
    pipe: Arc<Pipe>,
    rx: mpsc::Receiver<String>,
}

impl PipeReader {
    pub(super) fn new(id: HandleId, pipe: Arc<Pipe>, rx: mpsc::Receiver<String>) -> Self {
        Self { id, pipe, rx }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn pipe(&self) -> &Arc<Pipe> {
        &self.pipe
    }

    /// Next message, or `None` once the pipe is deleted and the queue drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.pipe.detach_reader(self.id);
    }
}

/// Sending end of a pipe attachment.
#[derive(Debug)]
pub struct PipeWriter {
    id: HandleId,
    pipe: Arc<Pipe>,
}

impl PipeWriter {
    pub(super) fn new(id: HandleId, pipe: Arc<Pipe>) -> Self {
        Self { id, pipe }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn pipe(&self) -> &Arc<Pipe> {
        &self.pipe
    }

    /// Write one message through the pipe. Never blocks.
    pub fn send(&self, message: &str) -> PlumbResult<()> {
        self.pipe.write(message)
    }

    /// Resolves once the pipe has been deleted.
    pub async fn closed(&self) {
        self.pipe.closed().await
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.pipe.detach_writer(self.id);
    }
}
