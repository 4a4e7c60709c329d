//! Pipe status snapshots and the display-only truncation view.

use serde::{Deserialize, Serialize};

use crate::mode::PipeMode;

/// Column headers of the pipe status table.
pub const PIPE_STATUS_HEADER: [&str; 7] =
    ["name", "mode", "readers", "writers", "count", "via", "previous"];

/// Point-in-time view of one pipe, taken under the pipe's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeStatus {
    pub name: String,
    pub mode: PipeMode,
    pub readers: usize,
    pub writers: usize,
    pub count: u64,
    pub via: Vec<String>,
    pub last: String,
}

impl PipeStatus {
    /// Render as a status row, optionally truncating the last message.
    ///
    /// Surrounding whitespace of the stored message is trimmed for display.
    /// The snapshot itself is left untouched.
    pub fn row(&self, truncate: Option<usize>) -> Vec<String> {
        let last = self.last.trim();
        let last = match truncate {
            Some(len) => truncate_message(last, len),
            None => last,
        };
        vec![
            self.name.clone(),
            self.mode.to_string(),
            self.readers.to_string(),
            self.writers.to_string(),
            self.count.to_string(),
            self.via.join(" "),
            last.to_string(),
        ]
    }
}

/// First `len` characters of `message`, or all of it when shorter.
pub fn truncate_message(message: &str, len: usize) -> &str {
    match message.char_indices().nth(len) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}
