pub mod auth;
pub mod connection;
pub mod ids;
pub mod protocol;

pub use auth::{AuthError, Authenticator, SharedSecretAuthenticator};
pub use connection::{Connection, User};
pub use ids::ConnectionId;
pub use protocol::{
    DataPayload, ErrorDescription, InitPayload, Location, MessageType, OperationMessage, ProtocolError,
    StartPayload,
};
