//! Small publish/subscribe topic used for snapshots, settings and alerts.

use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifier handed out for every subscription on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Callback<T>)>,
}

/// A typed topic. Publishing invokes every subscriber with a shared reference
/// to the value; a panicking subscriber is logged and skipped.
pub struct Topic<T> {
    name: &'static str,
    inner: Arc<Mutex<Subscribers<T>>>,
}

impl<T: 'static> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Registers `callback`. The subscription lasts until the returned guard is
    /// dropped or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut subscribers = lock(&self.inner);
            let id = SubscriptionId(subscribers.next_id);
            subscribers.next_id += 1;
            subscribers.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Subscribers<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            detach: Some(Box::new(move |id| {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Removes a subscription by id. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.inner).entries.retain(|(entry, _)| *entry != id);
    }

    /// Delivers `value` to every current subscriber and returns how many
    /// completed without panicking.
    pub fn publish(&self, value: &T) -> usize {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let callbacks: Vec<(SubscriptionId, Callback<T>)> = lock(&self.inner).entries.clone();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::warn!(
                        topic = self.name,
                        subscription = id.0,
                        reason = panic_message(&*panic),
                        "subscriber panicked; continuing with remaining subscribers"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Drops every subscriber.
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .inner
            .lock()
            .map(|subscribers| subscribers.entries.len())
            .unwrap_or_default();
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &count)
            .finish()
    }
}

/// Scoped subscription guard. Unsubscribes when dropped.
pub struct Subscription {
    id: SubscriptionId,
    detach: Option<Box<dyn FnOnce(SubscriptionId) + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    /// Keeps the subscription alive for the lifetime of the topic.
    pub fn forget(mut self) {
        self.detach = None;
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_to_every_subscriber() {
        let topic = Topic::<u32>::new("numbers");
        let total = Arc::new(AtomicUsize::new(0));

        let a = {
            let total = total.clone();
            topic.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            })
        };
        let b = {
            let total = total.clone();
            topic.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            })
        };

        assert_eq!(topic.publish(&5), 2);
        assert_eq!(total.load(Ordering::SeqCst), 10);
        drop((a, b));
    }

    #[test]
    fn dropping_the_guard_unsubscribes() {
        let topic = Topic::<u32>::new("numbers");
        let subscription = topic.subscribe(|_| {});
        assert_eq!(topic.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let topic = Topic::<u32>::new("numbers");
        let seen = Arc::new(AtomicUsize::new(0));

        let _faulty = topic.subscribe(|_| panic!("boom"));
        let _healthy = {
            let seen = seen.clone();
            topic.subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(topic.publish(&1), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_unsubscribe_by_id() {
        let topic = Topic::<u32>::new("numbers");
        let subscription = topic.subscribe(|_| {});
        let id = subscription.id();
        subscription.forget();

        assert_eq!(topic.subscriber_count(), 1);
        topic.unsubscribe(id);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn guard_outliving_topic_is_harmless() {
        let topic = Topic::<u32>::new("numbers");
        let subscription = topic.subscribe(|_| {});
        drop(topic);
        subscription.unsubscribe();
    }
}
