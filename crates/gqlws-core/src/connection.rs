use async_trait::async_trait;

use crate::ids::ConnectionId;
use crate::protocol::DataPayload;

/// Identity resolved from an auth token. Opaque to the protocol layer.
pub type User = serde_json::Value;

/// A live `graphql-ws` connection as seen by the subscription registry and
/// by publishers.
///
/// Sends suspend until the connection's write pump takes the frame or the
/// connection closes. After close they return immediately without writing.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> &ConnectionId;

    /// User bound by a successful `connection_init`, if any.
    fn user(&self) -> Option<User>;

    /// Deliver result data for one operation.
    async fn send_data(&self, operation_id: &str, payload: DataPayload);

    /// Deliver an error that is not tied to an operation.
    async fn send_error(&self, message: &str);
}
