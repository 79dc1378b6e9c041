use parking_lot::Mutex;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::warn;

/// Last-value channel with replay-latest subscriptions.
///
/// Every distinct transition is broadcast to current subscribers; a new
/// subscriber first receives the most recent value, then later transitions.
pub struct ValueChannel<T> {
    latest: Mutex<Option<T>>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone + PartialEq> ValueChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            latest: Mutex::new(None),
            sender,
        }
    }

    /// Most recent value, if any was published
    pub fn get(&self) -> Option<T> {
        self.latest.lock().clone()
    }

    /// Publish a value. Returns false when it equals the current value.
    pub fn publish(&self, value: T) -> bool {
        // Held across the send so a concurrent subscribe sees either the old
        // value plus this transition, or the new value without it.
        let mut latest = self.latest.lock();
        if latest.as_ref() == Some(&value) {
            return false;
        }
        *latest = Some(value.clone());
        let _ = self.sender.send(value);
        true
    }

    pub fn subscribe(&self) -> ValueSubscription<T> {
        let latest = self.latest.lock();
        ValueSubscription {
            pending: latest.clone(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of a [`ValueChannel`]
pub struct ValueSubscription<T> {
    pending: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> ValueSubscription<T> {
    /// Wait for the next value. Returns `None` once the channel is gone.
    ///
    /// Cancel-safe, so it can be raced in `tokio::select!`.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.pending.take() {
            return Some(value);
        }

        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Value subscriber lagged by {} updates; skipping to latest", skipped);
                    if let Some(value) = self.drain_to_latest() {
                        return Some(value);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn drain_to_latest(&mut self) -> Option<T> {
        let mut newest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(value) => newest = Some(value),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return newest,
            }
        }
    }
}
