//! Log sink for pipes with logging enabled.
//!
//! When a pipe's `log` flag is set, every write is handed to the registry's
//! sink after the pipe lock is released. The default sink turns writes into
//! structured `tracing` events; embedders can route them elsewhere.

use std::sync::Mutex;

/// Receives every message written to a pipe with logging enabled.
pub trait LogSink: Send + Sync {
    fn record(&self, pipe: &str, message: &str);
}

/// Emits pipe writes as `info` events on the `plumb::pipe` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, pipe: &str, message: &str) {
        tracing::info!(target: "plumb::pipe", pipe, message, "pipe write");
    }
}

/// Keeps every recorded write in memory, in order.
///
/// Used by tests and by embedders that poll recent traffic.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(pipe, message)` pairs recorded so far.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, pipe: &str, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pipe.to_string(), message.to_string()));
    }
}
