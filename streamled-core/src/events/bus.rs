//! Typed in-process publish/subscribe.
//!
//! A [`Topic<T>`] fans a value out to every current subscriber. Three
//! delivery modes are supported:
//!
//! - **sync**: the handler runs on the publisher's task before `publish`
//!   returns;
//! - **async**: each subscriber owns an unbounded queue drained by its own
//!   task, so the publisher never waits and per-subscriber order is kept;
//! - **once**: a oneshot slot that fires for the first published value and
//!   then removes itself.
//!
//! Publishing snapshots the subscriber list and delivers after releasing the
//! lock, so handlers may subscribe or unsubscribe freely.
//!
//! A [`Bus<T>`] groups topics by string key; the push monitor uses it to
//! correlate responses by nonce.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};

/// Handle returned by the `subscribe*` calls, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SyncHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

enum Delivery<T> {
    Sync(SyncHandler<T>),
    Queue(mpsc::UnboundedSender<T>),
    Once(Mutex<Option<oneshot::Sender<T>>>),
}

struct Subscriber<T> {
    id: SubscriptionId,
    delivery: Arc<Delivery<T>>,
}

struct TopicInner<T> {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

/// A single typed topic. Cloning yields another handle to the same topic.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Topic<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Topic<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TopicInner {
                next_id: AtomicU64::new(0),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    fn add(&self, delivery: Delivery<T>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                delivery: Arc::new(delivery),
            });
        id
    }

    /// Run `handler` inline for every published value.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.add(Delivery::Sync(Arc::new(handler)))
    }

    /// Receive published values through an unbounded channel.
    ///
    /// The subscription is dropped on the next publish after the receiver
    /// goes away.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add(Delivery::Queue(tx)), rx)
    }

    /// Run `handler` on a dedicated task for every published value.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_async<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (id, mut rx) = self.subscribe_channel();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                handler(value).await;
            }
        });
        id
    }

    /// Resolve with the first value published after this call.
    pub fn subscribe_once(&self) -> (SubscriptionId, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (self.add(Delivery::Once(Mutex::new(Some(tx)))), rx)
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `value` to every current subscriber.
    ///
    /// A topic without subscribers drops the value.
    pub fn publish(&self, value: T) {
        let snapshot: Vec<(SubscriptionId, Arc<Delivery<T>>)> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| (s.id, Arc::clone(&s.delivery)))
            .collect();

        if snapshot.is_empty() {
            return;
        }

        let mut finished = Vec::new();
        for (id, delivery) in snapshot {
            match delivery.as_ref() {
                Delivery::Sync(handler) => handler(value.clone()),
                Delivery::Queue(tx) => {
                    if tx.send(value.clone()).is_err() {
                        finished.push(id);
                    }
                }
                Delivery::Once(slot) => {
                    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(sender) = sender {
                        let _ = sender.send(value.clone());
                    }
                    finished.push(id);
                }
            }
        }

        if !finished.is_empty() {
            self.inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|s| !finished.contains(&s.id));
        }
    }
}

/// Topics addressed by string key.
pub struct Bus<T> {
    topics: Arc<RwLock<HashMap<String, Topic<T>>>>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            topics: Arc::clone(&self.topics),
        }
    }
}

impl<T> Default for Bus<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Bus<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the topic for `key`, creating it if needed.
    pub fn topic(&self, key: &str) -> Topic<T> {
        if let Some(topic) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return topic.clone();
        }
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_owned())
            .or_default()
            .clone()
    }

    /// Publish to `key`. Unknown keys are a no-op.
    pub fn publish(&self, key: &str, value: T) {
        let topic = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if let Some(topic) = topic {
            topic.publish(value);
        }
    }

    pub fn subscribe_once(&self, key: &str) -> oneshot::Receiver<T> {
        self.topic(key).subscribe_once().1
    }

    /// Drop the topic for `key` along with all its subscribers.
    pub fn remove(&self, key: &str) -> bool {
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
