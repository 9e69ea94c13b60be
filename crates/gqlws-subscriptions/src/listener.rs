use std::sync::Arc;

use gqlws_core::Connection;

use crate::subscription::Subscription;

/// Observer of registry changes, e.g. a component that starts or stops an
/// upstream feed as subscriptions come and go.
///
/// Hooks run synchronously on the task that changed the registry, after the
/// registry lock has been released.
pub trait SubscriptionListener: Send + Sync {
    fn subscription_added(&self, connection: &Arc<dyn Connection>, subscription: &Arc<Subscription>);

    fn subscription_removed(&self, connection: &Arc<dyn Connection>, subscription: &Arc<Subscription>);
}

/// Listener identity is the allocation, not the vtable.
pub(crate) fn same_listener(a: &Arc<dyn SubscriptionListener>, b: &Arc<dyn SubscriptionListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
