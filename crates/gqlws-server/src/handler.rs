use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use gqlws_core::{Authenticator, Connection, ConnectionId, ErrorDescription, StartPayload};
use gqlws_subscriptions::{describe, Subscription, SubscriptionManager};

use crate::connection::{ConnectionConfig, ConnectionEventHandler, ConnectionHandle, WsConnection};
use crate::transport::{FrameSink, FrameStream};

/// Connects live sockets to the subscription registry.
///
/// `start` registers a subscription whose results go back over the socket,
/// `stop` removes it, and closing a socket drops all of its subscriptions.
pub struct SubscriptionHandler {
    manager: Arc<SubscriptionManager>,
    connections: DashMap<ConnectionId, Arc<WsConnection>>,
}

impl SubscriptionHandler {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            manager,
            connections: DashMap::new(),
        }
    }

    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<WsConnection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Start a connection actor over the socket halves and track it until it
    /// closes.
    pub fn accept(
        self: &Arc<Self>,
        sink: FrameSink,
        stream: FrameStream,
        config: ConnectionConfig,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> ConnectionHandle {
        let events: Arc<dyn ConnectionEventHandler> = Arc::clone(self) as Arc<dyn ConnectionEventHandler>;
        let handle = WsConnection::spawn(sink, stream, config, events, authenticator);

        let connection = &handle.connection;
        self.connections
            .insert(connection.id().clone(), Arc::clone(connection));
        // The close hook may have run before the insert.
        if connection.is_closed() {
            self.connections.remove(connection.id());
        }

        handle
    }
}

#[async_trait]
impl ConnectionEventHandler for SubscriptionHandler {
    async fn on_start(
        &self,
        connection: &Arc<WsConnection>,
        operation_id: &str,
        payload: StartPayload,
    ) -> Result<(), Vec<ErrorDescription>> {
        tracing::debug!(
            connection_id = %connection.id(),
            operation_id = %operation_id,
            user = ?connection.user(),
            "Start operation"
        );

        let conn: Arc<dyn Connection> = connection.clone();
        let sender = Arc::clone(connection);
        let op_id = operation_id.to_string();

        let subscription = Subscription::new(operation_id, payload.query)
            .with_variables(payload.variables.unwrap_or_default())
            .with_operation_name(payload.operation_name)
            .with_connection(Arc::clone(&conn))
            .with_send_data(move |data| {
                let sender = Arc::clone(&sender);
                let op_id = op_id.clone();
                Box::pin(async move { sender.send_data(&op_id, data).await })
            });

        self.manager
            .add_subscription(&conn, subscription)
            .map(|_| ())
            .map_err(|errors| describe(&errors))
    }

    async fn on_stop(&self, connection: &Arc<WsConnection>, operation_id: &str) {
        tracing::debug!(connection_id = %connection.id(), operation_id = %operation_id, "Stop operation");
        let conn: Arc<dyn Connection> = connection.clone();
        self.manager.remove_subscription(&conn, operation_id);
    }

    fn on_close(&self, connection: &Arc<WsConnection>) {
        tracing::debug!(
            connection_id = %connection.id(),
            user = ?connection.user(),
            "Closing connection"
        );
        let conn: Arc<dyn Connection> = connection.clone();
        self.manager.remove_subscriptions(&conn);
        self.connections.remove(connection.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{memory_transport, Peer};
    use gqlws_core::DataPayload;
    use gqlws_subscriptions::StaticSchema;
    use serde_json::json;

    fn handler() -> Arc<SubscriptionHandler> {
        let schema = StaticSchema::builder()
            .subscription("Subscription", [("users", "[String]")])
            .build()
            .unwrap();
        Arc::new(SubscriptionHandler::new(Arc::new(SubscriptionManager::new(Arc::new(schema)))))
    }

    fn connect(handler: &Arc<SubscriptionHandler>) -> (ConnectionHandle, Peer) {
        let (sink, stream, peer) = memory_transport();
        let handle = handler.accept(sink, stream, ConnectionConfig::default(), None);
        (handle, peer)
    }

    /// Round-trip an init so every earlier frame has been processed.
    async fn sync(peer: &mut Peer) {
        peer.send_json(json!({"type": "connection_init"}));
        assert_eq!(peer.recv_json().await.unwrap(), json!({"type": "connection_ack"}));
    }

    #[tokio::test]
    async fn start_registers_and_delivers_data() {
        let handler = handler();
        let (handle, mut peer) = connect(&handler);
        assert_eq!(handler.connection_count(), 1);

        peer.send_json(json!({
            "type": "start",
            "id": "1",
            "payload": {"query": "subscription { users }", "variables": {"limit": 2}}
        }));
        sync(&mut peer).await;

        let registered = handler.manager().subscriptions();
        let subscription = &registered[handle.connection.id()]["1"];
        assert_eq!(subscription.fields(), ["users".to_string()]);
        assert_eq!(subscription.variables["limit"], json!(2));

        for subscription in handler.manager().matching("users") {
            subscription
                .send(DataPayload::from_data(json!({"users": ["ada"]})))
                .await;
        }
        assert_eq!(
            peer.recv_json().await.unwrap(),
            json!({"type": "data", "id": "1", "payload": {"data": {"users": ["ada"]}, "errors": null}})
        );
    }

    #[tokio::test]
    async fn invalid_start_is_reported_and_not_registered() {
        let handler = handler();
        let (_handle, mut peer) = connect(&handler);

        peer.send_json(json!({"type": "start", "id": "1", "payload": {"query": "subscription { foo }"}}));
        assert_eq!(
            peer.recv_json().await.unwrap(),
            json!({
                "type": "error",
                "id": "1",
                "payload": [{
                    "message": "Cannot query field \"foo\" on type \"Subscription\".",
                    "locations": [{"line": 1, "column": 16}]
                }]
            })
        );
        assert!(handler.manager().subscriptions().is_empty());
    }

    #[tokio::test]
    async fn duplicate_start_is_reported() {
        let handler = handler();
        let (_handle, mut peer) = connect(&handler);

        let start = json!({"type": "start", "id": "1", "payload": {"query": "subscription { users }"}});
        peer.send_json(start.clone());
        peer.send_json(start);

        let reply = peer.recv_json().await.unwrap();
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["id"], "1");
        assert!(reply["payload"][0]["message"]
            .as_str()
            .unwrap()
            .starts_with("Cannot register subscription 1 twice"));
        assert_eq!(handler.manager().count(), 1);
    }

    #[tokio::test]
    async fn stop_removes_subscription() {
        let handler = handler();
        let (_handle, mut peer) = connect(&handler);

        peer.send_json(json!({"type": "start", "id": "1", "payload": {"query": "subscription { users }"}}));
        peer.send_json(json!({"type": "start", "id": "2", "payload": {"query": "subscription { users }"}}));
        peer.send_json(json!({"type": "stop", "id": "1"}));
        sync(&mut peer).await;

        let ids: Vec<String> = handler
            .manager()
            .matching("users")
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[tokio::test]
    async fn close_drops_connection_and_subscriptions() {
        let handler = handler();
        let (first, mut first_peer) = connect(&handler);
        let (_second, mut second_peer) = connect(&handler);

        for peer in [&mut first_peer, &mut second_peer] {
            peer.send_json(json!({"type": "start", "id": "1", "payload": {"query": "subscription { users }"}}));
            sync(peer).await;
        }
        assert_eq!(handler.manager().count(), 2);

        first_peer.send_json(json!({"type": "connection_terminate"}));
        first.join().await;

        assert_eq!(handler.connection_count(), 1);
        assert_eq!(handler.manager().count(), 1);
        assert_eq!(handler.manager().connection_count(), 1);
    }
}
