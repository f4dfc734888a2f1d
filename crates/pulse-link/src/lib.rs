//! Persistent per-service connections and the event fan-out they feed.
//!
//! [`ConnectionManager`] owns one connection per configured backend,
//! decodes inbound frames, drops keep-alives and malformed frames, and
//! hands every remaining event to an [`EventDispatcher`].

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod mock;
pub mod status;
pub mod transport;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use config::{LinkConfig, ServiceEndpoint};
pub use dispatcher::{EventDispatcher, Listener, ListenerHandle, ListenerId};
pub use error::TransportError;
pub use manager::ConnectionManager;
pub use status::{ConnectionState, LinkStats, ServiceStatus};
pub use transport::{Frame, FrameSink, FrameStream, Link, Transport};
pub use ws::WsTransport;
