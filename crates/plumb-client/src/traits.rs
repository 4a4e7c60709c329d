//! Common traits for pipe clients.

use async_trait::async_trait;
use thiserror::Error;

use plumb_types::PlumbError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur when using a pipe client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection to the hosting node failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine rejected the operation.
    #[error(transparent)]
    Plumb(#[from] PlumbError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The attachment has been closed.
    #[error("not connected")]
    NotConnected,

    /// Other errors.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Receiving side of an attachment.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` once the pipe or connection is gone.
    async fn recv(&mut self) -> ClientResult<Option<String>>;
}

/// Sending side of an attachment.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, message: &str) -> ClientResult<()>;

    /// Detach. Later sends fail with [`ClientError::NotConnected`].
    async fn close(&mut self) -> ClientResult<()>;
}

/// Attach to pipes, wherever they are hosted.
///
/// Dropping a returned source or sink detaches it.
#[async_trait]
pub trait PipeAccess: Send + Sync {
    async fn attach_reader(&self, pipe: &str) -> ClientResult<Box<dyn MessageSource>>;

    async fn attach_writer(&self, pipe: &str) -> ClientResult<Box<dyn MessageSink>>;

    /// Reader and writer on the same pipe.
    async fn attach(&self, pipe: &str) -> ClientResult<(Box<dyn MessageSource>, Box<dyn MessageSink>)>;

    /// Write one message through a short-lived writer.
    async fn write(&self, pipe: &str, message: &str) -> ClientResult<()> {
        let mut writer = self.attach_writer(pipe).await?;
        writer.send(message).await?;
        writer.close().await
    }
}
