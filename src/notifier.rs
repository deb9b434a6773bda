//! A value cell that broadcasts to subscribers.
//!
//! The game uses it to announce turn changes and claim transitions, but it
//! knows nothing about either.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use crate::lock;

pub type SubscriptionId = u64;

pub const DEFAULT_CAPACITY: usize = 16;

struct Inner<T> {
    value: T,
    next_id: SubscriptionId,
    channels: HashMap<SubscriptionId, Sender<T>>,
}

/// Holds a value and a set of subscriber channels keyed by subscription id.
///
/// `set` does not announce; call `announce` to push the current value to every
/// subscriber. Delivery never blocks: a subscriber whose buffer is full misses
/// the announcement and a subscriber whose receiver was dropped is removed.
pub struct Notifier<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
}

impl<T: Clone> Notifier<T> {
    pub fn new(value: T) -> Self {
        Self::with_capacity(value, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(value: T, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                next_id: 0,
                channels: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new channel. Keep the id to unsubscribe later, unused
    /// subscriptions only fill up and drop announcements.
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<T>) {
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.channels.insert(id, tx);

        tracing::debug!(subscription = id, "subscribed");
        (id, rx)
    }

    /// Returns false if there was no such subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = lock(&self.inner).channels.remove(&id).is_some();
        tracing::debug!(subscription = id, removed, "unsubscribed");
        removed
    }

    /// Sends the current value to every subscriber and returns how many
    /// received it.
    pub fn announce(&self) -> usize {
        let mut inner = lock(&self.inner);
        let value = inner.value.clone();

        let mut delivered = 0;
        let mut closed = vec![];
        for (&id, tx) in inner.channels.iter() {
            match tx.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscription = id, "subscriber is full, announcement dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            inner.channels.remove(&id);
            tracing::debug!(subscription = id, "pruned closed subscriber");
        }

        delivered
    }

    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    pub fn set(&self, value: T) {
        lock(&self.inner).value = value;
    }

    /// Read-modify-write of the value under a single lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut lock(&self.inner).value)
    }

    pub fn subscribers(&self) -> usize {
        lock(&self.inner).channels.len()
    }
}

impl<T: Clone + Default> Default for Notifier<T> {
    fn default() -> Self {
        Notifier::new(T::default())
    }
}
