//! Hosting side of remote attachments.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use plumb_types::{AttachReply, AttachRequest, PlumbError, PlumbResult};

use super::codec_error;
use crate::namespace;
use crate::pipe::PipeReader;
use crate::registry::Registry;

/// Accepts remote attachments to pipes in a registry.
#[derive(Debug, Clone)]
pub struct RemoteServer {
    registry: Registry,
    max_line: usize,
}

impl RemoteServer {
    pub fn new(registry: Registry) -> Self {
        let max_line = registry.settings().max_line;
        Self { registry, max_line }
    }

    /// Bind `addr` and serve until the task is dropped.
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding remote proxy to {addr}"))?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("reading listener address")?;
        tracing::info!("remote proxy listening on {local}");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let registry = self.registry.clone();
            let max_line = self.max_line;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, registry, max_line).await {
                    tracing::warn!(%peer, "remote attachment ended: {e}");
                }
            });
        }
    }
}

async fn reject(framed: &mut Framed<TcpStream, LinesCodec>, err: PlumbError) -> PlumbResult<()> {
    let reply = serde_json::to_string(&AttachReply::rejected(err.to_string()))?;
    // the peer may already be gone; the original error is what matters
    let _ = framed.send(reply).await;
    Err(err)
}

/// Next message for a remote reader, or pending forever for writer-only peers.
async fn next_message(reader: &mut Option<PipeReader>) -> Option<String> {
    match reader {
        Some(reader) => reader.recv().await,
        None => std::future::pending().await,
    }
}

#[tracing::instrument(level = "debug", skip(stream, registry))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Registry,
    max_line: usize,
) -> PlumbResult<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line));

    let line = match framed.next().await {
        Some(line) => line.map_err(codec_error)?,
        None => return Ok(()),
    };
    let request: AttachRequest = match serde_json::from_str(&line) {
        Ok(request) => request,
        Err(e) => return reject(&mut framed, e.into()).await,
    };
    if !namespace::is_qualified(&request.pipe) {
        let err = PlumbError::invalid(format!("pipe name must be qualified: {}", request.pipe));
        return reject(&mut framed, err).await;
    }

    let pipe = registry.get_or_create(&request.pipe);
    let mut reader = match request.role.reads().then(|| pipe.attach_reader()).transpose() {
        Ok(reader) => reader,
        Err(e) => return reject(&mut framed, e).await,
    };
    let mut writer = match request.role.writes().then(|| pipe.attach_writer()).transpose() {
        Ok(writer) => writer,
        Err(e) => return reject(&mut framed, e).await,
    };

    framed
        .send(serde_json::to_string(&AttachReply::accepted())?)
        .await
        .map_err(codec_error)?;
    tracing::info!(pipe = %request.pipe, role = ?request.role, "remote attached");

    let closed = pipe.close_token();
    let (mut sink, mut lines) = framed.split();
    let mut remote_open = true;

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            message = next_message(&mut reader) => {
                let Some(message) = message else {
                    break;
                };
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(pipe = %request.pipe, "remote reader unreachable, detached: {e}");
                    break;
                }
            }
            line = lines.next(), if remote_open => match line {
                Some(Ok(line)) => match &writer {
                    Some(writer) => {
                        if writer.send(&line).is_err() {
                            break;
                        }
                    }
                    None => tracing::debug!(pipe = %request.pipe, "ignoring data from read-only peer"),
                },
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(pipe = %request.pipe, max_line, "remote line too long, dropped");
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    tracing::warn!(pipe = %request.pipe, "remote connection failed, detached: {e}");
                    break;
                }
                None => {
                    // duplex half-close: stop writing, keep delivering to the peer
                    remote_open = false;
                    writer = None;
                    if reader.is_none() || !request.role.writes() {
                        break;
                    }
                }
            },
        }
    }

    drop(reader);
    drop(writer);
    let _ = sink.close().await;
    tracing::info!(pipe = %request.pipe, "remote detached");
    Ok(())
}
