use std::fmt;
use std::sync::Arc;

use async_graphql_parser::types::ExecutableDocument;
use futures::future::BoxFuture;
use gqlws_core::{Connection, DataPayload};

/// Delivers result data of a subscription to its subscriber.
pub type SendDataFn = Arc<dyn Fn(DataPayload) -> BoxFuture<'static, ()> + Send + Sync>;

/// A client operation tracked by the registry.
///
/// Built from a `start` message and handed to
/// [`SubscriptionManager::add_subscription`](crate::SubscriptionManager::add_subscription),
/// which fills in the parsed document and root fields. Once registered it is
/// shared as an `Arc<Subscription>` and never changes again.
#[derive(Clone, Default)]
pub struct Subscription {
    pub id: String,
    pub query: String,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub operation_name: Option<String>,
    pub connection: Option<Arc<dyn Connection>>,
    pub send_data: Option<SendDataFn>,
    pub(crate) document: Option<Arc<ExecutableDocument>>,
    pub(crate) fields: Vec<String>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_variables(mut self, variables: serde_json::Map<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: Option<String>) -> Self {
        self.operation_name = name;
        self
    }

    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_send_data<F>(mut self, f: F) -> Self
    where
        F: Fn(DataPayload) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.send_data = Some(Arc::new(f));
        self
    }

    /// Parsed query, present once the subscription passed validation.
    pub fn document(&self) -> Option<&ExecutableDocument> {
        self.document.as_deref()
    }

    /// Root subscription field names, empty until validated.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether this subscription listens to `field`.
    pub fn matches_field(&self, field: &str) -> bool {
        self.document.is_some() && self.fields.iter().any(|name| name == field)
    }

    /// Push result data to the subscriber.
    pub async fn send(&self, payload: DataPayload) {
        if let Some(send_data) = &self.send_data {
            send_data(payload).await;
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .field("connection", &self.connection.as_ref().map(|c| c.id().clone()))
            .field("fields", &self.fields)
            .field("validated", &self.document.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unvalidated_subscription_matches_nothing() {
        let mut sub = Subscription::new("1", "subscription { users }");
        sub.fields = vec!["users".into()];
        assert!(!sub.matches_field("users"));
    }

    #[test]
    fn validated_subscription_matches_its_fields() {
        let mut sub = Subscription::new("1", "subscription { users }");
        sub.document = Some(Arc::new(
            async_graphql_parser::parse_query(&sub.query).unwrap(),
        ));
        sub.fields = vec!["users".into()];
        assert!(sub.matches_field("users"));
        assert!(!sub.matches_field("posts"));
    }

    #[tokio::test]
    async fn send_invokes_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new("1", "subscription { users }").with_send_data(move |_| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        sub.send(DataPayload::default()).await;
        sub.send(DataPayload::default()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_without_callback_is_noop() {
        Subscription::new("1", "subscription { users }")
            .send(DataPayload::default())
            .await;
    }
}
