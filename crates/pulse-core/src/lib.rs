pub mod errors;
pub mod events;
pub mod ids;
pub mod status;

pub use errors::DecodeError;
pub use events::{
    decode_frame, ConnectionNotice, ConnectionStatus, Event, EventKind, InboundFrame,
    RequestUpdate, KEEPALIVE_FRAME, NORMAL_CLOSURE,
};
pub use ids::{RequestId, ServiceName};
pub use status::RequestStatus;
