use std::sync::Arc;

use futures::future::join_all;
use gqlws_core::DataPayload;
use gqlws_subscriptions::SubscriptionManager;
use tokio::sync::broadcast;

/// Result data for every subscription listening to a root field.
#[derive(Clone, Debug, PartialEq)]
pub struct Publication {
    pub field: String,
    pub payload: DataPayload,
}

impl Publication {
    pub fn new(field: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            payload: DataPayload::from_data(data),
        }
    }
}

/// Fans publications out to matching subscriptions.
pub struct PublicationBridge {
    manager: Arc<SubscriptionManager>,
}

impl PublicationBridge {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self { manager }
    }

    /// Deliver one publication. Returns the number of subscriptions reached.
    pub async fn publish(&self, publication: &Publication) -> usize {
        let subscriptions = self.manager.matching(&publication.field);
        join_all(
            subscriptions
                .iter()
                .map(|subscription| subscription.send(publication.payload.clone())),
        )
        .await;

        tracing::debug!(
            field = %publication.field,
            delivered = subscriptions.len(),
            "Published"
        );
        subscriptions.len()
    }

    /// Spawn a task that publishes everything received on `rx`.
    pub fn start(self, mut rx: broadcast::Receiver<Publication>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(publication) => {
                        self.publish(&publication).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Publication bridge lagged, dropped publications");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Publication channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create a publication bridge wired to a broadcast channel.
pub fn create_bridge(
    manager: Arc<SubscriptionManager>,
    rx: broadcast::Receiver<Publication>,
) -> tokio::task::JoinHandle<()> {
    PublicationBridge::new(manager).start(rx)
}
