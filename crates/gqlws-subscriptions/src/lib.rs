//! Subscription registry for `graphql-ws` servers.
//!
//! Subscriptions are parsed, validated against a [`Schema`] and tracked per
//! connection by the [`SubscriptionManager`]. Publishers look up matching
//! subscriptions by root field name.

pub mod error;
pub mod fields;
pub mod listener;
pub mod manager;
pub mod schema;
pub mod subscription;
mod validation;

pub use error::{describe, SubscriptionError};
pub use fields::subscription_field_names;
pub use listener::SubscriptionListener;
pub use manager::{ConnectionSubscriptions, SubscriptionManager, Subscriptions};
pub use schema::{FieldDefinition, ObjectType, Schema, SchemaBuilder, SchemaError, StaticSchema};
pub use subscription::{SendDataFn, Subscription};
