//! Clients for reaching plumb pipes.
//!
//! This crate provides two ways to attach to a pipe:
//!
//! - **LocalClient**: Direct in-process access to a `Registry`.
//!   Best for embedding plumb in other Rust applications.
//!
//! - **RemoteClient**: Connects to a node's remote proxy over TCP.
//!   Best for CLI tools and pipes hosted on other nodes.
//!
//! Both implement [`PipeAccess`], so code that moves messages does not care
//! where the pipe lives.
//!
//! # Example
//!
//! ```ignore
//! use plumb_client::{LocalClient, PipeAccess, RemoteClient};
//! use plumb_kernel::Registry;
//!
//! // Local client (in-process)
//! let client = LocalClient::new(Registry::new());
//! client.write("foo", "hello").await?;
//!
//! // Remote client
//! let client = RemoteClient::at("10.0.0.2:9331");
//! let mut reader = client.attach_reader("foo").await?;
//! let message = reader.recv().await?;
//! ```

mod embedded;
mod remote;
mod traits;

pub use embedded::LocalClient;
pub use remote::{RemoteClient, RemoteReader, RemoteWriter};
pub use traits::{ClientError, ClientResult, MessageSink, MessageSource, PipeAccess};
