//! Cluster transport: how a node reaches pipes hosted elsewhere.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use plumb_types::{AttachReply, AttachRequest, AttachRole, DEFAULT_MAX_LINE, PlumbError, PlumbResult};

use super::codec_error;

/// A newline-framed connection to a pipe on some node.
pub type LineStream = Framed<TcpStream, LinesCodec>;

/// What the engine needs from the cluster layer.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// This node's name.
    fn node(&self) -> &str;

    /// Announce that this node hosts `pipe`.
    async fn advertise(&self, pipe: &str) -> PlumbResult<()>;

    /// Open a stream to `pipe` on `node`, attached with `role`.
    async fn open(&self, node: &str, pipe: &str, role: AttachRole) -> PlumbResult<LineStream>;
}

/// TCP transport with a static peer table.
#[derive(Debug)]
pub struct TcpTransport {
    node: String,
    peers: HashMap<String, String>,
    advertised: Mutex<BTreeSet<String>>,
    max_line: usize,
}

impl TcpTransport {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            peers: HashMap::new(),
            advertised: Mutex::new(BTreeSet::new()),
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Add a peer reachable at `addr` (`host:port`).
    pub fn with_peer(mut self, node: impl Into<String>, addr: impl Into<String>) -> Self {
        self.peers.insert(node.into(), addr.into());
        self
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.peers.extend(peers);
        self
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    pub fn peer_addr(&self, node: &str) -> Option<&str> {
        self.peers.get(node).map(String::as_str)
    }

    /// Pipes announced through [`ClusterTransport::advertise`], sorted.
    pub fn advertised(&self) -> Vec<String> {
        self.advertised
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClusterTransport for TcpTransport {
    fn node(&self) -> &str {
        &self.node
    }

    async fn advertise(&self, pipe: &str) -> PlumbResult<()> {
        let added = self
            .advertised
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pipe.to_string());
        if added {
            tracing::debug!(node = %self.node, pipe, "pipe advertised");
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn open(&self, node: &str, pipe: &str, role: AttachRole) -> PlumbResult<LineStream> {
        let addr = self
            .peer_addr(node)
            .ok_or_else(|| PlumbError::Network(format!("unknown node: {node}")))?;
        connect(addr, pipe, role, self.max_line).await
    }
}

/// Connect to a node's proxy at `addr` and attach to `pipe`.
pub async fn connect(addr: &str, pipe: &str, role: AttachRole, max_line: usize) -> PlumbResult<LineStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PlumbError::Network(format!("{addr}: {e}")))?;
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line));

    let request = AttachRequest {
        pipe: pipe.to_string(),
        role,
    };
    framed
        .send(serde_json::to_string(&request)?)
        .await
        .map_err(codec_error)?;

    let line = framed
        .next()
        .await
        .ok_or_else(|| PlumbError::Network("connection closed during handshake".into()))?
        .map_err(codec_error)?;
    let reply: AttachReply = serde_json::from_str(&line)?;

    if !reply.ok {
        let reason = reply.error.unwrap_or_else(|| "no reason given".into());
        return Err(PlumbError::Network(format!("attach to {pipe} rejected: {reason}")));
    }
    Ok(framed)
}
