//! Local client for direct in-process pipe access.
//!
//! The `LocalClient` wraps a `Registry` and implements `PipeAccess` without
//! any network hop. This is ideal for:
//!
//! - Embedding plumb in other Rust applications
//! - Unit testing
//! - The node that hosts the pipes

use std::sync::Arc;

use async_trait::async_trait;

use plumb_kernel::namespace::{self, DEFAULT_NAMESPACE};
use plumb_kernel::{ClusterTransport, Pipe, PipeReader, PipeWriter, Registry};

use crate::traits::{ClientError, ClientResult, MessageSink, MessageSource, PipeAccess};

/// A client that attaches to pipes in a local `Registry`.
///
/// Bare pipe names are qualified with the client's namespace.
///
/// # Example
///
/// ```ignore
/// use plumb_client::{LocalClient, PipeAccess};
/// use plumb_kernel::Registry;
///
/// let client = LocalClient::new(Registry::new());
/// let mut reader = client.attach_reader("foo").await?;
/// client.write("foo", "hello").await?;
/// assert_eq!(reader.recv().await?, Some("hello".into()));
/// ```
pub struct LocalClient {
    registry: Registry,
    namespace: String,
    transport: Option<Arc<dyn ClusterTransport>>,
}

impl LocalClient {
    /// Create a client over `registry` in the default namespace.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            namespace: DEFAULT_NAMESPACE.to_string(),
            transport: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Advertise every pipe this client touches on `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn ClusterTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn pipe(&self, name: &str) -> ClientResult<Arc<Pipe>> {
        let name = namespace::qualify(&self.namespace, name);
        let pipe = self.registry.get_or_create(&name);
        if let Some(transport) = &self.transport {
            transport.advertise(&name).await?;
        }
        Ok(pipe)
    }
}

#[async_trait]
impl PipeAccess for LocalClient {
    async fn attach_reader(&self, pipe: &str) -> ClientResult<Box<dyn MessageSource>> {
        let reader = self.pipe(pipe).await?.attach_reader()?;
        Ok(Box::new(LocalReader(reader)))
    }

    async fn attach_writer(&self, pipe: &str) -> ClientResult<Box<dyn MessageSink>> {
        let writer = self.pipe(pipe).await?.attach_writer()?;
        Ok(Box::new(LocalWriter(Some(writer))))
    }

    async fn attach(&self, pipe: &str) -> ClientResult<(Box<dyn MessageSource>, Box<dyn MessageSink>)> {
        let pipe = self.pipe(pipe).await?;
        let reader = pipe.attach_reader()?;
        let writer = pipe.attach_writer()?;
        Ok((Box::new(LocalReader(reader)), Box::new(LocalWriter(Some(writer)))))
    }
}

struct LocalReader(PipeReader);

#[async_trait]
impl MessageSource for LocalReader {
    async fn recv(&mut self) -> ClientResult<Option<String>> {
        Ok(self.0.recv().await)
    }
}

struct LocalWriter(Option<PipeWriter>);

#[async_trait]
impl MessageSink for LocalWriter {
    async fn send(&mut self, message: &str) -> ClientResult<()> {
        let writer = self.0.as_ref().ok_or(ClientError::NotConnected)?;
        writer.send(message)?;
        Ok(())
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.0.take();
        Ok(())
    }
}
