//! Typed observable values with last-value replay
//!
//! The UI layer consumes engine state (transcript text, connection state,
//! recording flag, language selections) through observables: every subscriber
//! immediately sees the current value and then every subsequent `set`.
//! Delivery is value-based, so a slow subscriber observes the latest value
//! rather than a backlog of intermediate ones.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared observable value.
///
/// Cloning an `Observable` clones the handle, not the value; all clones
/// publish to and read from the same slot.
#[derive(Debug, Clone)]
pub struct Observable<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T: Clone> Observable<T> {
    /// Create an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Read the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the current value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the current value in place and notify subscribers.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    /// Subscribe to this observable.
    ///
    /// The returned subscription replays the current value on its first
    /// `next()` and then yields every later change.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
            replayed: false,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A handle yielding the values of one [`Observable`] over time.
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    replayed: bool,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next value.
    ///
    /// The first call resolves immediately with the value current at
    /// subscription time. Returns `None` once the observable is gone.
    pub async fn next(&mut self) -> Option<T> {
        if !self.replayed {
            self.replayed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Read the latest value without waiting.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_current_value() {
        let obs = Observable::new(7u32);
        let mut sub = obs.subscribe();
        assert_eq!(sub.next().await, Some(7));
    }

    #[tokio::test]
    async fn test_set_notifies_subscriber() {
        let obs = Observable::new(String::new());
        let mut sub = obs.subscribe();
        assert_eq!(sub.next().await, Some(String::new()));

        obs.set("hello".to_string());
        assert_eq!(sub.next().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let obs = Observable::new("a".to_string());
        obs.update(|s| s.push('b'));
        assert_eq!(obs.get(), "ab");
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_latest_only() {
        let obs = Observable::new(1u32);
        obs.set(2);
        obs.set(3);

        let mut sub = obs.subscribe();
        assert_eq!(sub.next().await, Some(3));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_observable_dropped() {
        let obs = Observable::new(1u32);
        let mut sub = obs.subscribe();
        assert_eq!(sub.next().await, Some(1));

        drop(obs);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn test_clone_shares_slot() {
        tokio_test::block_on(async {
            let a = Observable::new(0i64);
            let b = a.clone();
            b.set(42);
            assert_eq!(a.get(), 42);
        });
    }
}
