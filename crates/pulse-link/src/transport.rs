use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::config::ServiceEndpoint;
use crate::error::TransportError;

/// One message on a full-duplex connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close with an optional status code.
    Close(Option<u16>),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An established connection, split into its two halves.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections to service endpoints.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> Result<Link, TransportError>;
}
