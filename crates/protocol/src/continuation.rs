//! Single-shot completion callbacks
//!
//! A `Continuation` is consumed by `complete`, so it can run at most once.
//! If it is dropped without being completed it reports
//! `DeliveryError::Abandoned`, so it also runs at least once.

use std::fmt;
use std::sync::Arc;

use crate::error::{DeliveryError, DeliveryResult};
use crate::event::Event;

type Callback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// Completion callback for one event (or one flush request)
pub struct Continuation {
    callback: Option<Callback>,
}

impl Continuation {
    /// Wrap a callback
    pub fn new(callback: impl FnOnce(DeliveryResult) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A continuation that ignores its result
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Invoke the callback with the delivery outcome
    pub fn complete(mut self, result: DeliveryResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// Shorthand for `complete(Ok(()))`
    #[inline]
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// Shorthand for `complete(Err(err))`
    #[inline]
    pub fn fail(self, err: DeliveryError) {
        self.complete(Err(err));
    }

    /// Chain an observer that sees the result before this continuation runs
    pub fn inspect(self, observer: impl FnOnce(&DeliveryResult) + Send + 'static) -> Self {
        Self::new(move |result| {
            observer(&result);
            self.complete(result);
        })
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!("continuation dropped without completion");
            callback(Err(DeliveryError::Abandoned));
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// An event travelling through a pipeline together with its continuation
#[derive(Debug)]
pub struct Envelope {
    pub event: Arc<Event>,
    pub continuation: Continuation,
}

impl Envelope {
    #[inline]
    pub fn new(event: Arc<Event>, continuation: Continuation) -> Self {
        Self {
            event,
            continuation,
        }
    }

    /// Complete this envelope's continuation
    #[inline]
    pub fn complete(self, result: DeliveryResult) {
        self.continuation.complete(result);
    }
}

#[cfg(test)]
#[path = "continuation_test.rs"]
mod continuation_test;
