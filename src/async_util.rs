use std::pin::Pin;
use std::task;
use std::time::Duration;

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use async_lock::Mutex;
use futures_core::Stream;
use futures_lite::FutureExt;
use futures_timer::Delay;

/// Single-slot register for the result of a "foreign" callback.
///
/// The operation side locks the excluder right before issuing a request that will produce
/// the callback; the callback side delivers the result with [Excluder::unlock]. A result
/// delivered while the excluder is not locked is dropped, so a callback fired twice for
/// one request resolves the request once.
pub struct Excluder<T: Send> {
    inner: Mutex<Option<async_channel::Sender<T>>>,
}

/// Makes waiting for the result of the "foreign" callback possible.
pub struct ResultWaiter<T: Send> {
    receiver: async_channel::Receiver<T>,
}

impl<T: Send> Excluder<T> {
    /// Creates a new unlocked `Excluder`.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Locks the excluder if it is unlocked.
    ///
    /// A lock whose `ResultWaiter` has been dropped counts as released.
    pub fn try_lock(&self) -> Option<ResultWaiter<T>> {
        let mut guard_inner = self.inner.lock_blocking();
        if guard_inner.as_ref().is_some_and(|s| !s.is_closed()) {
            return None;
        }
        let (sender, receiver) = async_channel::bounded(1);
        guard_inner.replace(sender);
        Some(ResultWaiter { receiver })
    }

    /// Sends the result from the "foreign" callback and unlocks the excluder.
    ///
    /// Returns `false` if no operation was waiting.
    pub fn unlock(&self, result: T) -> bool {
        let sender = self.inner.lock_blocking().take();
        match sender {
            Some(sender) => sender.try_send(result).is_ok(),
            None => false,
        }
    }

    /// Releases the lock without a result; the waiter sees `None`.
    pub fn cancel(&self) {
        let _ = self.inner.lock_blocking().take();
    }
}

impl<T: Send> Default for Excluder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ResultWaiter<T> {
    /// Waits until the result is sent from the "foreign" callback. Returns `None` when the
    /// optional timeout is reached or the lock is cancelled.
    pub async fn wait_unlock(self, timeout: Option<Duration>) -> Option<T> {
        let recv = async { self.receiver.recv().await.ok() };
        match timeout {
            Some(dur) => {
                recv.or(async {
                    Delay::new(dur).await;
                    None
                })
                .await
            }
            None => recv.await,
        }
    }
}

/// Broadcasts values from "foreign" callbacks to every existing `NotifierReceiver`.
pub struct Notifier<T: Send + Clone> {
    sender: Sender<Option<T>>,
    #[allow(unused)]
    sender_keeper: InactiveReceiver<Option<T>>,
}

pub struct NotifierReceiver<T: Send + Clone> {
    receiver: Option<Receiver<Option<T>>>,
}

impl<T: Send + Clone> Notifier<T> {
    /// Creates a new `Notifier`. A receiver lagging more than `capacity` values behind loses
    /// the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        sender.set_await_active(false);
        Self {
            sender,
            sender_keeper: receiver.deactivate(),
        }
    }

    /// Creates a new `NotifierReceiver` that observes values sent from now on.
    pub fn subscribe(&self) -> NotifierReceiver<T> {
        NotifierReceiver {
            receiver: Some(self.sender.new_receiver()),
        }
    }

    /// Sends a notification value from the "foreign" callback.
    pub fn notify(&self, value: T) {
        let _ = self.sender.try_broadcast(Some(value));
    }

    /// Ends every receiver's stream after the values already sent.
    pub fn close(&self) {
        let _ = self.sender.try_broadcast(None);
        self.sender.close();
    }
}

impl<T: Send + Clone> Stream for NotifierReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Option<T>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return task::Poll::Ready(None);
        };
        match Pin::new(receiver).poll_next(cx) {
            task::Poll::Ready(Some(Some(value))) => task::Poll::Ready(Some(value)),
            task::Poll::Ready(_) => {
                let _ = self.receiver.take();
                task::Poll::Ready(None)
            }
            task::Poll::Pending => task::Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.receiver {
            Some(receiver) => (receiver.len(), None),
            None => (0, Some(0)),
        }
    }
}

impl<T: Send + Clone> Drop for Notifier<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use futures_lite::StreamExt;

    #[test]
    fn excluder_resolves_once() {
        let excluder = Excluder::<u32>::new();
        let waiter = excluder.try_lock().unwrap();
        assert!(excluder.try_lock().is_none());
        assert!(excluder.unlock(1));
        assert!(!excluder.unlock(2));
        assert_eq!(block_on(waiter.wait_unlock(None)), Some(1));
        assert!(excluder.try_lock().is_some());
    }

    #[test]
    fn dropped_waiter_releases_lock() {
        let excluder = Excluder::<u32>::new();
        drop(excluder.try_lock().unwrap());
        assert!(excluder.try_lock().is_some());
    }

    #[test]
    fn cancelled_lock_yields_none() {
        let excluder = Excluder::<u32>::new();
        let waiter = excluder.try_lock().unwrap();
        excluder.cancel();
        assert_eq!(block_on(waiter.wait_unlock(None)), None);
    }

    #[test]
    fn waiter_times_out() {
        let excluder = Excluder::<u32>::new();
        let waiter = excluder.try_lock().unwrap();
        let res = block_on(waiter.wait_unlock(Some(Duration::from_millis(10))));
        assert_eq!(res, None);
    }

    #[test]
    fn notifier_delivers_to_each_receiver_until_closed() {
        let notifier = Notifier::<u8>::new(8);
        notifier.notify(0);
        let a = notifier.subscribe();
        let mut b = notifier.subscribe();
        notifier.notify(1);
        notifier.notify(2);
        notifier.close();
        notifier.notify(3);
        assert_eq!(block_on(a.collect::<Vec<_>>()), vec![1, 2]);
        assert_eq!(block_on(b.next()), Some(1));
        assert_eq!(block_on(b.next()), Some(2));
        assert_eq!(block_on(b.next()), None);
        assert_eq!(block_on(b.next()), None);
    }
}
