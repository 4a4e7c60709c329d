//! Remote client for pipes hosted on another node.
//!
//! The `RemoteClient` opens one TCP stream per attachment, either straight
//! to a proxy address or through a `ClusterTransport` by node name. The
//! hosting node treats the stream as an ordinary reader and/or writer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::codec::LinesCodecError;

use plumb_kernel::namespace::{self, DEFAULT_NAMESPACE};
use plumb_kernel::remote::connect;
use plumb_kernel::{ClusterTransport, LineStream};
use plumb_types::{AttachRole, DEFAULT_MAX_LINE};

use crate::traits::{ClientError, ClientResult, MessageSink, MessageSource, PipeAccess};

enum Target {
    Address(String),
    Node {
        transport: Arc<dyn ClusterTransport>,
        node: String,
    },
}

/// A client that attaches to pipes through a node's remote proxy.
///
/// # Example
///
/// ```ignore
/// use plumb_client::{PipeAccess, RemoteClient};
///
/// let client = RemoteClient::at("127.0.0.1:9331");
/// let (mut reader, mut writer) = client.attach("foo").await?;
/// writer.send("hello").await?;
/// assert_eq!(reader.recv().await?, Some("hello".into()));
/// ```
pub struct RemoteClient {
    target: Target,
    namespace: String,
    max_line: usize,
}

impl RemoteClient {
    /// Connect to the proxy listening at `addr`.
    pub fn at(addr: impl Into<String>) -> Self {
        Self::new(Target::Address(addr.into()))
    }

    /// Reach `node` through `transport`.
    pub fn on_node(transport: Arc<dyn ClusterTransport>, node: impl Into<String>) -> Self {
        Self::new(Target::Node {
            transport,
            node: node.into(),
        })
    }

    fn new(target: Target) -> Self {
        Self {
            target,
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Namespace bare pipe names are qualified into.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    async fn open(&self, pipe: &str, role: AttachRole) -> ClientResult<LineStream> {
        let pipe = namespace::qualify(&self.namespace, pipe);
        let stream = match &self.target {
            Target::Address(addr) => connect(addr, &pipe, role, self.max_line).await,
            Target::Node { transport, node } => transport.open(node, &pipe, role).await,
        };
        let stream = stream.map_err(|e| ClientError::Connection(e.to_string()))?;
        tracing::debug!(%pipe, ?role, "remote attach accepted");
        Ok(stream)
    }
}

#[async_trait]
impl PipeAccess for RemoteClient {
    async fn attach_reader(&self, pipe: &str) -> ClientResult<Box<dyn MessageSource>> {
        let stream = self.open(pipe, AttachRole::Reader).await?;
        Ok(Box::new(RemoteReader::new(stream)))
    }

    async fn attach_writer(&self, pipe: &str) -> ClientResult<Box<dyn MessageSink>> {
        let stream = self.open(pipe, AttachRole::Writer).await?;
        Ok(Box::new(RemoteWriter::new(stream)))
    }

    async fn attach(&self, pipe: &str) -> ClientResult<(Box<dyn MessageSource>, Box<dyn MessageSink>)> {
        let stream = self.open(pipe, AttachRole::Duplex).await?;
        let (sink, lines) = stream.split();
        Ok((Box::new(RemoteReader::new(lines)), Box::new(RemoteWriter::new(sink))))
    }
}

/// Messages arriving from a remote pipe.
pub struct RemoteReader<S> {
    lines: S,
}

impl<S> RemoteReader<S> {
    pub fn new(lines: S) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl<S> MessageSource for RemoteReader<S>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin + Send,
{
    async fn recv(&mut self) -> ClientResult<Option<String>> {
        match self.lines.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(ClientError::Connection(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Messages going to a remote pipe.
pub struct RemoteWriter<K> {
    sink: K,
    closed: bool,
}

impl<K> RemoteWriter<K> {
    pub fn new(sink: K) -> Self {
        Self { sink, closed: false }
    }
}

#[async_trait]
impl<K> MessageSink for RemoteWriter<K>
where
    K: Sink<String, Error = LinesCodecError> + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> ClientResult<()> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        self.sink
            .send(message.to_string())
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }

    /// Half-closes the stream; a duplex reader keeps receiving.
    async fn close(&mut self) -> ClientResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plumb_kernel::{Registry, RemoteServer, TcpTransport};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn start_server(registry: Registry) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = RemoteServer::new(registry);
        tokio::spawn(async move { server.serve_listener(listener).await });
        addr
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_remote_duplex_round_trip() {
        let registry = Registry::new();
        let addr = start_server(registry.clone()).await;
        let client = RemoteClient::at(addr);

        let (mut reader, mut writer) = client.attach("foo").await.expect("attach failed");
        writer.send("hello").await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), reader.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some("hello".to_string()));

        let pipe = registry.get("default//foo").expect("pipe missing");
        assert_eq!((pipe.num_readers(), pipe.num_writers()), (1, 1));
    }

    #[tokio::test]
    async fn test_remote_half_close_keeps_reading() {
        let registry = Registry::new();
        let addr = start_server(registry.clone()).await;
        let client = RemoteClient::at(addr);

        let (mut reader, mut writer) = client.attach("foo").await.unwrap();
        writer.close().await.unwrap();

        let pipe = registry.get("default//foo").unwrap();
        wait_for(|| pipe.num_writers() == 0).await;
        assert_eq!(pipe.num_readers(), 1);

        pipe.write("still here").unwrap();
        let got = tokio::time::timeout(Duration::from_secs(5), reader.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some("still here".to_string()));
    }

    #[tokio::test]
    async fn test_remote_through_transport() {
        let registry = Registry::new();
        let addr = start_server(registry.clone()).await;
        let transport = Arc::new(TcpTransport::new("n1").with_peer("n2", addr));
        let client = RemoteClient::on_node(transport, "n2").with_namespace("lab");

        let mut reader = client.attach_reader("bar").await.unwrap();
        client.write("bar", "over the wire").await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), reader.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some("over the wire".to_string()));
        assert_eq!(registry.get("lab//bar").unwrap().num_messages(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_connection_error() {
        let transport = Arc::new(TcpTransport::new("n1"));
        let client = RemoteClient::on_node(transport, "nowhere");
        let err = client.attach_reader("foo").await.err().expect("should fail");
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
