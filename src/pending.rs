//! Pending requests — correlation table for in-flight queries.
//!
//! Each outgoing query registers its `requestId` and receives a oneshot
//! receiver. The socket reader resolves entries as results arrive, in any
//! order. A caller that gives up drops its entry; a result arriving for a
//! dropped or unknown id is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::frame::new_request_id;

struct Pending<T> {
    issued_at: Instant,
    resolve: oneshot::Sender<T>,
}

/// Shared, cloneable correlation table.
pub struct PendingRequests<T> {
    inner: Arc<Mutex<HashMap<String, Pending<T>>>>,
}

impl<T> Clone for PendingRequests<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<T> PendingRequests<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pending<T>>> {
        // A poisoned table only means a holder panicked mid-insert; the map
        // itself is still consistent.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a fresh request id.
    pub fn register(&self) -> (String, oneshot::Receiver<T>) {
        let request_id = new_request_id();
        let (tx, rx) = oneshot::channel();
        self.lock()
            .insert(request_id.clone(), Pending { issued_at: Instant::now(), resolve: tx });
        (request_id, rx)
    }

    /// Deliver a result. Returns false when no caller is waiting on `request_id`.
    pub fn resolve(&self, request_id: &str, value: T) -> bool {
        let Some(pending) = self.lock().remove(request_id) else {
            return false;
        };
        pending.resolve.send(value).is_ok()
    }

    /// Drop a request the caller stopped waiting for.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.lock().remove(request_id).is_some()
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn expire(&self, max_age: Duration) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, p| p.issued_at.elapsed() < max_age);
        before - map.len()
    }

    /// Drop every entry. Waiting callers observe a closed channel.
    pub fn clear(&self) -> usize {
        let mut map = self.lock();
        let count = map.len();
        map.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
