use std::collections::HashMap;
use std::sync::Arc;

use async_graphql_parser::parse_query;
use gqlws_core::{Connection, ConnectionId};
use parking_lot::{Mutex, RwLock};

use crate::error::SubscriptionError;
use crate::fields::subscription_field_names;
use crate::listener::{same_listener, SubscriptionListener};
use crate::schema::Schema;
use crate::subscription::Subscription;

/// Subscriptions of one connection by operation id.
pub type ConnectionSubscriptions = HashMap<String, Arc<Subscription>>;

/// All subscriptions grouped by connection.
pub type Subscriptions = HashMap<ConnectionId, ConnectionSubscriptions>;

/// Registry of active subscriptions across all connections.
///
/// One lock guards every mutation and enumeration, so publishers never
/// observe a half-applied add or remove. A connection key exists only while
/// it has at least one subscription.
pub struct SubscriptionManager {
    schema: Arc<dyn Schema>,
    subscriptions: RwLock<Subscriptions>,
    listeners: Mutex<Vec<Arc<dyn SubscriptionListener>>>,
}

impl SubscriptionManager {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self {
            schema,
            subscriptions: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all registered subscriptions.
    pub fn subscriptions(&self) -> Subscriptions {
        self.subscriptions.read().clone()
    }

    /// Registered subscriptions listening to `field`, ordered by connection
    /// and operation id.
    pub fn matching(&self, field: &str) -> Vec<Arc<Subscription>> {
        let subscriptions = self.subscriptions.read();
        let mut matches: Vec<(&ConnectionId, &String, &Arc<Subscription>)> = subscriptions
            .iter()
            .flat_map(|(conn, subs)| subs.iter().map(move |(id, sub)| (conn, id, sub)))
            .filter(|(_, _, sub)| sub.matches_field(field))
            .collect();
        matches.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        matches.into_iter().map(|(_, _, sub)| Arc::clone(sub)).collect()
    }

    /// Total number of registered subscriptions.
    pub fn count(&self) -> usize {
        self.subscriptions.read().values().map(HashMap::len).sum()
    }

    /// Number of connections with at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Validate `subscription` and register it under `connection`.
    ///
    /// Nothing is mutated unless every check passes. Structural problems are
    /// all reported together; a parse failure yields exactly one error; schema
    /// validation yields every violation.
    pub fn add_subscription(
        &self,
        connection: &Arc<dyn Connection>,
        mut subscription: Subscription,
    ) -> Result<Arc<Subscription>, Vec<SubscriptionError>> {
        tracing::info!(
            connection_id = %connection.id(),
            subscription_id = %subscription.id,
            "Add subscription"
        );

        let errors = validate_structure(connection, &subscription);
        if !errors.is_empty() {
            tracing::warn!(errors = ?errors, "Failed to add invalid subscription");
            return Err(errors);
        }

        let document = parse_query(&subscription.query).map_err(|err| {
            tracing::warn!(err = %err, "Failed to parse subscription query");
            vec![SubscriptionError::Parse(err.to_string())]
        })?;

        let errors = self.schema.validate(&document);
        if !errors.is_empty() {
            tracing::warn!(errors = ?errors, "Failed to validate subscription query");
            return Err(errors);
        }

        subscription.fields = subscription_field_names(&document);
        subscription.document = Some(Arc::new(document));
        let subscription = Arc::new(subscription);

        {
            let mut subscriptions = self.subscriptions.write();
            let entry = subscriptions.entry(connection.id().clone()).or_default();
            if entry.contains_key(&subscription.id) {
                tracing::warn!(
                    connection_id = %connection.id(),
                    subscription_id = %subscription.id,
                    "Cannot register subscription twice"
                );
                return Err(vec![SubscriptionError::Duplicate {
                    connection: connection.id().clone(),
                    id: subscription.id.clone(),
                }]);
            }
            entry.insert(subscription.id.clone(), Arc::clone(&subscription));
        }

        for listener in self.listeners_snapshot() {
            listener.subscription_added(connection, &subscription);
        }

        Ok(subscription)
    }

    /// Remove the subscription `id` of `connection`. Listeners are notified
    /// only when something was actually removed.
    pub fn remove_subscription(&self, connection: &Arc<dyn Connection>, id: &str) -> Option<Arc<Subscription>> {
        tracing::info!(connection_id = %connection.id(), subscription_id = %id, "Remove subscription");

        let removed = {
            let mut subscriptions = self.subscriptions.write();
            let entry = subscriptions.get_mut(connection.id())?;
            let removed = entry.remove(id);
            if entry.is_empty() {
                subscriptions.remove(connection.id());
            }
            removed
        };

        match &removed {
            Some(subscription) => {
                for listener in self.listeners_snapshot() {
                    listener.subscription_removed(connection, subscription);
                }
            }
            None => tracing::debug!(subscription_id = %id, "Subscription was not registered"),
        }
        removed
    }

    /// Remove every subscription of `connection`, returning them ordered by id.
    pub fn remove_subscriptions(&self, connection: &Arc<dyn Connection>) -> Vec<Arc<Subscription>> {
        tracing::info!(connection_id = %connection.id(), "Remove subscriptions");

        let Some(removed) = self.subscriptions.write().remove(connection.id()) else {
            return Vec::new();
        };

        let mut removed: Vec<Arc<Subscription>> = removed.into_values().collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));

        let listeners = self.listeners_snapshot();
        for subscription in &removed {
            for listener in &listeners {
                listener.subscription_removed(connection, subscription);
            }
        }
        removed
    }

    /// Register a listener. Adding the same listener twice has no effect.
    pub fn add_subscription_listener(&self, listener: Arc<dyn SubscriptionListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_subscription_listener(&self, listener: &Arc<dyn SubscriptionListener>) {
        self.listeners.lock().retain(|l| !same_listener(l, listener));
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn SubscriptionListener>> {
        self.listeners.lock().clone()
    }
}

fn validate_structure(connection: &Arc<dyn Connection>, subscription: &Subscription) -> Vec<SubscriptionError> {
    let mut errors = Vec::new();
    if subscription.id.is_empty() {
        errors.push(SubscriptionError::EmptyId);
    }
    match &subscription.connection {
        None => errors.push(SubscriptionError::MissingConnection),
        Some(owner) if owner.id() != connection.id() => errors.push(SubscriptionError::ConnectionMismatch {
            subscription: owner.id().clone(),
            connection: connection.id().clone(),
        }),
        Some(_) => {}
    }
    if subscription.query.is_empty() {
        errors.push(SubscriptionError::EmptyQuery);
    }
    if subscription.send_data.is_none() {
        errors.push(SubscriptionError::MissingSendData);
    }
    errors
}
