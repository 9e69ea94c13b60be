pub mod bridge;
pub mod connection;
pub mod handler;
pub mod server;
pub mod transport;

pub use bridge::{create_bridge, Publication, PublicationBridge};
pub use connection::{ConnectionConfig, ConnectionEventHandler, ConnectionHandle, WsConnection};
pub use handler::SubscriptionHandler;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use transport::{split_websocket, Frame, FrameSink, FrameStream, TransportError};
