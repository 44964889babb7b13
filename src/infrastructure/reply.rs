use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

type Settle<T> = Box<dyn FnOnce(T) + Send>;

/// A reply slot that can be settled at most once.
///
/// Clones share the slot, so several async branches can race to answer the same
/// request; the first `settle` wins and every later one is a no-op returning
/// `false`.
pub struct ReplyOnce<T> {
    slot: Arc<Mutex<Option<Settle<T>>>>,
}

impl<T> Clone for ReplyOnce<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> fmt::Debug for ReplyOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyOnce")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: Send + 'static> ReplyOnce<T> {
    pub fn new<F>(settle: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(settle)))),
        }
    }

    /// A reply slot backed by a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let reply = Self::new(move |value| {
            // The waiter may have given up.
            let _ = tx.send(value);
        });
        (reply, rx)
    }

    pub fn settle(&self, value: T) -> bool {
        let settle = self.slot.lock().take();
        match settle {
            Some(settle) => {
                settle(value);
                true
            }
            None => false,
        }
    }
}

impl<T> ReplyOnce<T> {
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}
