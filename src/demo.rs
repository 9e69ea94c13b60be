//! Demo schema and publisher served by the binary.

use std::time::Duration;

use gqlws_server::Publication;
use gqlws_subscriptions::{SchemaError, StaticSchema};
use serde_json::json;
use tokio::sync::broadcast;

/// `Query.hello` plus a `Subscription.tick` stream.
pub fn schema() -> Result<StaticSchema, SchemaError> {
    StaticSchema::builder()
        .query("Query", [("hello", "String")])
        .subscription("Subscription", [("tick", "Tick!")])
        .object("Tick", [("count", "Int!"), ("at", "String")])
        .build()
}

pub fn tick(count: u64) -> Publication {
    Publication::new(
        "tick",
        json!({"tick": {"count": count, "at": chrono::Utc::now().to_rfc3339()}}),
    )
}

/// Publish a tick every `interval` until the channel has no receivers left.
pub fn start_ticker(tx: broadcast::Sender<Publication>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume first immediate tick
        let mut count = 0u64;
        loop {
            ticker.tick().await;
            count += 1;
            if tx.send(tick(count)).is_err() {
                tracing::info!("No publication receivers left, stopping ticker");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_query;
    use gqlws_subscriptions::Schema;

    #[test]
    fn schema_accepts_tick_subscription() {
        let schema = schema().unwrap();
        let document = parse_query("subscription { tick { count at } }").unwrap();
        assert!(schema.validate(&document).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_publishes_increasing_counts() {
        let (tx, mut rx) = broadcast::channel(16);
        let task = start_ticker(tx, Duration::from_secs(1));

        assert_eq!(rx.recv().await.unwrap().payload.data["tick"]["count"], 1);
        assert_eq!(rx.recv().await.unwrap().payload.data["tick"]["count"], 2);

        drop(rx);
        task.await.unwrap();
    }
}
