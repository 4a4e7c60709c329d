//! Handshake frames of the remote attachment protocol.
//!
//! A remote attachment is a newline-framed byte stream. The first line from
//! the client is an [`AttachRequest`] as JSON, answered by one [`AttachReply`]
//! line. Every later line in either direction is one pipe message.

use serde::{Deserialize, Serialize};

/// Largest line accepted on framed streams (remote and stage I/O).
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// Which side(s) of the pipe a remote peer attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachRole {
    Reader,
    Writer,
    Duplex,
}

impl AttachRole {
    pub fn reads(self) -> bool {
        matches!(self, AttachRole::Reader | AttachRole::Duplex)
    }

    pub fn writes(self) -> bool {
        matches!(self, AttachRole::Writer | AttachRole::Duplex)
    }
}

/// First frame sent by a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachRequest {
    /// Fully qualified pipe name.
    pub pipe: String,
    pub role: AttachRole,
}

/// Hosting node's answer to an [`AttachRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttachReply {
    pub fn accepted() -> Self {
        Self { ok: true, error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
