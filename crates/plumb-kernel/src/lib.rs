//! plumb kernel: named pipes and branching pipelines across a cluster.
//!
//! # Architecture
//!
//! ```text
//! CommandRegistry ──▶ Plumber ──▶ Registry ──▶ Pipe ──▶ readers (local, via, remote)
//!                        │                      ▲
//!                        └── program stages ────┘
//!
//! RemoteServer ◀──── TCP, one JSON handshake line then message lines ────▶ ClusterTransport
//! ```
//!
//! - [`Registry`]: name → [`Pipe`] table; pipes are created on first reference
//! - [`Pipe`]: non-blocking fan-out in `all`, `round-robin` or `random` mode
//! - [`ViaProcess`]: per-reader transform process
//! - [`Plumber`]: wires pipes and programs into pipelines and tears them down
//! - [`RemoteServer`] / [`ClusterTransport`]: pipe access from other nodes
//! - [`commands`]: the `plumb`, `pipe` and `clear` commands

pub mod commands;
pub mod config;
pub mod namespace;
pub mod pipe;
pub mod plumber;
pub mod registry;
pub mod remote;
pub mod sink;
pub mod via;

pub use commands::{Command, CommandContext, CommandRegistry, CommandSchema, register_builtins};
pub use config::PlumbConfig;
pub use pipe::{HandleId, Pipe, PipeReader, PipeSettings, PipeWriter};
pub use plumber::{Endpoint, PathResolver, Plumber, SearchPath};
pub use registry::Registry;
pub use remote::{ClusterTransport, LineStream, RemoteServer, TcpTransport};
pub use sink::{LogSink, MemoryLogSink, TracingLogSink};
pub use via::ViaProcess;

// Shared vocabulary
pub use plumb_types::*;
