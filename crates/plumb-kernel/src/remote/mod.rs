//! Remote access proxy.
//!
//! A node hosting pipes runs a [`RemoteServer`]. Peers reach it through a
//! [`ClusterTransport`], which hands back a line-framed stream already
//! attached to the requested pipe. On the hosting side a remote reader is
//! an ordinary reader slot, so fan-out treats it like any local reader.

mod server;
mod transport;

pub use server::RemoteServer;
pub use transport::{ClusterTransport, LineStream, TcpTransport, connect};

use tokio_util::codec::LinesCodecError;

use plumb_types::PlumbError;

/// Framing failures on a remote stream are network errors.
pub(crate) fn codec_error(err: LinesCodecError) -> PlumbError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => PlumbError::Network("line exceeds max length".into()),
        LinesCodecError::Io(e) => PlumbError::Network(e.to_string()),
    }
}
