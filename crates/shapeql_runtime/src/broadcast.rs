//! Multi-subscriber event channels.
//!
//! A [`Broadcaster`] delivers every published value to every subscriber
//! registered at the moment of publishing, in publish order. Publishing
//! runs the callbacks on the publisher's thread. The channel ends with
//! exactly one terminal notification, either a failure or completion.

use crate::error::BroadcastError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What a subscriber is told.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    Next(T),
    Failed(BroadcastError),
    Completed,
}

type Callback<T> = Arc<dyn Fn(&Notification<T>) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    callback: Callback<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

struct Registry<T> {
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
    terminated: bool,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    // Serializes deliveries so every subscriber sees one global order.
    delivery: Mutex<()>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send + 'static> Detach for Shared<T> {
    fn detach(&self, id: u64) {
        lock(&self.registry).subscribers.retain(|s| s.id != id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking callback must not wedge the channel for everyone else.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A multi-subscriber event channel.
///
/// Callbacks run while the channel's delivery lock is held, so a callback
/// must not publish to, fail, or complete the channel that invoked it.
/// Subscribing and unsubscribing from inside a callback are fine.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.shared.registry);
        f.debug_struct("Broadcaster")
            .field("subscribers", &registry.subscribers.len())
            .field("terminated", &registry.terminated)
            .finish()
    }
}

impl<T: Send + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    next_id: 0,
                    subscribers: Vec::new(),
                    terminated: false,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Registers `callback` for every notification published after this
    /// call returns.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionHandle, BroadcastError>
    where
        F: Fn(&Notification<T>) + Send + Sync + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut registry = lock(&self.shared.registry);
        if registry.terminated {
            return Err(BroadcastError::Terminated);
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
            cancelled: Arc::clone(&cancelled),
        });
        trace!(subscriber = id, total = registry.subscribers.len(), "subscribed");
        drop(registry);

        let shared: Arc<dyn Detach> = self.shared.clone();
        Ok(SubscriptionHandle {
            id,
            cancelled,
            channel: Arc::downgrade(&shared),
        })
    }

    /// Delivers `value` to every current subscriber, in registration order.
    ///
    /// Returns the number of subscribers the value reached.
    pub fn publish(&self, value: T) -> Result<usize, BroadcastError> {
        let _delivery = lock(&self.shared.delivery);
        let snapshot = {
            let registry = lock(&self.shared.registry);
            if registry.terminated {
                return Err(BroadcastError::Terminated);
            }
            registry.subscribers.clone()
        };

        let notification = Notification::Next(value);
        let delivered = deliver(&snapshot, &notification);
        if delivered < snapshot.len() {
            lock(&self.shared.registry)
                .subscribers
                .retain(|s| !s.cancelled.load(Ordering::Acquire));
        }
        trace!(delivered, "published");
        Ok(delivered)
    }

    /// Fails the channel. Every subscriber receives the error once, then the
    /// channel releases them and rejects further use.
    pub fn fail(&self, message: impl fmt::Display) -> Result<usize, BroadcastError> {
        self.terminate(Notification::Failed(BroadcastError::Source(message.to_string())))
    }

    /// Completes the channel. Every subscriber receives the completion once.
    pub fn complete(&self) -> Result<usize, BroadcastError> {
        self.terminate(Notification::Completed)
    }

    fn terminate(&self, notification: Notification<T>) -> Result<usize, BroadcastError> {
        let _delivery = lock(&self.shared.delivery);
        let subscribers = {
            let mut registry = lock(&self.shared.registry);
            if registry.terminated {
                return Err(BroadcastError::Terminated);
            }
            registry.terminated = true;
            std::mem::take(&mut registry.subscribers)
        };
        let delivered = deliver(&subscribers, &notification);
        debug!(
            delivered,
            failed = matches!(notification, Notification::Failed(_)),
            "channel terminated"
        );
        Ok(delivered)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.registry).subscribers.len()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.registry).terminated
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Subscribes through an async stream instead of a callback.
    pub fn stream(&self) -> Result<EventStream<T>, BroadcastError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = self.subscribe(move |notification: &Notification<T>| {
            // Closed only after the stream dropped, which also unsubscribes.
            let _ = sender.send(notification.clone());
        })?;
        Ok(EventStream {
            receiver,
            handle,
            finished: false,
        })
    }
}

fn deliver<T>(subscribers: &[Subscriber<T>], notification: &Notification<T>) -> usize {
    let mut delivered = 0;
    for subscriber in subscribers {
        if subscriber.cancelled.load(Ordering::Acquire) {
            continue;
        }
        (subscriber.callback)(notification);
        delivered += 1;
    }
    delivered
}

/// Cancels one subscription.
///
/// Dropping a handle does not unsubscribe; only [`SubscriptionHandle::unsubscribe`]
/// does. Handles are cheap to clone, so a callback can own one to cancel
/// itself.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    channel: Weak<dyn Detach>,
}

impl SubscriptionHandle {
    /// Stops delivery to this subscriber, including the remainder of a
    /// publish already in progress. Returns `false` if it was already
    /// cancelled.
    pub fn unsubscribe(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.id);
        }
        trace!(subscriber = self.id, "unsubscribed");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A subscription read as an async stream.
#[derive(Debug)]
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<Notification<T>>,
    handle: SubscriptionHandle,
    finished: bool,
}

impl<T> EventStream<T> {
    /// Waits for the next event.
    ///
    /// Yields `Some(Err(..))` once if the channel fails, and `None` after
    /// completion, failure, or cancellation.
    pub async fn next(&mut self) -> Option<Result<T, BroadcastError>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(Notification::Next(value)) => Some(Ok(value)),
            Some(Notification::Failed(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            Some(Notification::Completed) | None => {
                self.finished = true;
                None
            }
        }
    }

    /// Unsubscribes. Events already queued are still yielded. Dropping the
    /// stream has the same effect.
    pub fn cancel(&self) -> bool {
        self.handle.unsubscribe()
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn recorder<T: Clone + Send + 'static>(
        channel: &Broadcaster<T>,
    ) -> (SubscriptionHandle, Arc<Mutex<Vec<Notification<T>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = channel
            .subscribe(move |n: &Notification<T>| sink.lock().unwrap().push(n.clone()))
            .unwrap();
        (handle, seen)
    }

    #[test]
    fn test_delivers_in_publish_order() {
        let channel = Broadcaster::new();
        let (_a, seen_a) = recorder(&channel);
        let (_b, seen_b) = recorder(&channel);

        for i in 1..=3 {
            assert_eq!(channel.publish(i).unwrap(), 2);
        }
        let expected = vec![
            Notification::Next(1),
            Notification::Next(2),
            Notification::Next(3),
        ];
        assert_eq!(*seen_a.lock().unwrap(), expected);
        assert_eq!(*seen_b.lock().unwrap(), expected);
    }

    #[test]
    fn test_late_subscriber_sees_only_later_events() {
        let channel = Broadcaster::new();
        channel.publish("early").unwrap();
        let (_handle, seen) = recorder(&channel);
        channel.publish("late").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Notification::Next("late")]);
    }

    #[test]
    fn test_fail_reaches_every_subscriber_once() {
        let channel: Broadcaster<i32> = Broadcaster::new();
        let (_a, seen_a) = recorder(&channel);
        let (_b, seen_b) = recorder(&channel);

        assert_eq!(channel.fail("disk full").unwrap(), 2);
        let failed = Notification::Failed(BroadcastError::Source("disk full".into()));
        assert_eq!(*seen_a.lock().unwrap(), vec![failed.clone()]);
        assert_eq!(*seen_b.lock().unwrap(), vec![failed]);

        assert!(channel.is_terminated());
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.publish(1), Err(BroadcastError::Terminated));
        assert_eq!(channel.fail("again"), Err(BroadcastError::Terminated));
        assert_eq!(channel.complete(), Err(BroadcastError::Terminated));
        assert!(matches!(
            channel.subscribe(|_| {}),
            Err(BroadcastError::Terminated)
        ));
        assert_eq!(seen_a.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_complete() {
        let channel: Broadcaster<i32> = Broadcaster::new();
        let (_handle, seen) = recorder(&channel);
        channel.publish(1).unwrap();
        channel.complete().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Notification::Next(1), Notification::Completed]
        );
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let channel = Broadcaster::new();
        let (handle, seen) = recorder(&channel);
        channel.publish(1).unwrap();
        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        assert!(handle.is_cancelled());
        assert_eq!(channel.publish(2).unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![Notification::Next(1)]);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let channel = Broadcaster::new();
        let own: Arc<OnceLock<SubscriptionHandle>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let slot = Arc::clone(&own);
        let sink = Arc::clone(&seen);
        let handle = channel
            .subscribe(move |n: &Notification<i32>| {
                sink.lock().unwrap().push(n.clone());
                if let Some(handle) = slot.get() {
                    handle.unsubscribe();
                }
            })
            .unwrap();
        own.set(handle).unwrap();

        channel.publish(1).unwrap();
        channel.publish(2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Notification::Next(1)]);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_takes_effect_mid_publish() {
        let channel = Broadcaster::new();
        let victim: Arc<OnceLock<SubscriptionHandle>> = Arc::new(OnceLock::new());

        let slot = Arc::clone(&victim);
        let _first = channel
            .subscribe(move |_: &Notification<i32>| {
                if let Some(handle) = slot.get() {
                    handle.unsubscribe();
                }
            })
            .unwrap();
        let (second, seen) = recorder(&channel);
        victim.set(second).unwrap();

        assert_eq!(channel.publish(1).unwrap(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_inside_callback_does_not_see_current_event() {
        let channel = Broadcaster::new();
        let late = Arc::new(Mutex::new(None));

        let inner_channel = channel.clone();
        let late_slot = Arc::clone(&late);
        let _outer = channel
            .subscribe(move |_: &Notification<i32>| {
                let mut slot = late_slot.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(recorder(&inner_channel));
                }
            })
            .unwrap();

        channel.publish(1).unwrap();
        channel.publish(2).unwrap();
        let guard = late.lock().unwrap();
        let (_, seen) = guard.as_ref().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Notification::Next(2)]);
    }

    #[tokio::test]
    async fn test_event_stream() {
        let channel = Broadcaster::new();
        let mut stream = channel.stream().unwrap();

        channel.publish("a").unwrap();
        channel.publish("b").unwrap();
        channel.fail("boom").unwrap();

        assert_eq!(stream.next().await, Some(Ok("a")));
        assert_eq!(stream.next().await, Some(Ok("b")));
        assert_eq!(
            stream.next().await,
            Some(Err(BroadcastError::Source("boom".into())))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_event_stream_cancel() {
        let channel = Broadcaster::new();
        let mut stream = channel.stream().unwrap();
        channel.publish(1).unwrap();
        assert!(stream.cancel());
        assert_eq!(channel.publish(2).unwrap(), 0);

        assert_eq!(stream.next().await, Some(Ok(1)));
        assert_eq!(stream.next().await, None);
    }
}
