//! Correlation of outgoing calls to their eventual reply.
//!
//! [`PromiseRepository`] maps a unique id to a pending completion. Each entry
//! is resolved at most once: `complete`, `fail` and `remove` all take the entry
//! out under the same lock, so whichever runs first wins and the others are
//! no-ops.
//!
//! The [`PromiseHandle`] returned by `create` is the caller's side. It removes
//! its entry when it resolves or when it is dropped, so abandoning a request
//! (caller-side timeout) never leaks an entry.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::promise::PromiseRepository;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let repo: PromiseRepository<String> = PromiseRepository::new();
//! let handle = repo.create("42", "Heartbeat").unwrap();
//!
//! assert!(repo.complete("42", "ok".to_string()));
//! assert!(!repo.complete("42", "late".to_string())); // second reply is a no-op
//!
//! assert_eq!(handle.await.unwrap(), "ok");
//! assert!(repo.is_empty());
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{OcppError, Result};

/// A pending outgoing call.
struct PendingRequest<T> {
    /// Action of the call, used to pick the reply's payload type.
    action: String,
    /// Completion side of the caller's handle.
    tx: oneshot::Sender<Result<T>>,
}

/// Shared table of pending calls.
///
/// Cloning is cheap and yields a handle to the same table.
pub struct PromiseRepository<T> {
    entries: Arc<Mutex<HashMap<String, PendingRequest<T>>>>,
}

impl<T> Clone for PromiseRepository<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for PromiseRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PromiseRepository<T> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new pending call.
    ///
    /// Fails with [`OcppError::DuplicateId`] if `unique_id` is still pending.
    /// With generated ids that is an invariant violation, not a retryable
    /// condition.
    pub fn create(&self, unique_id: &str, action: &str) -> Result<PromiseHandle<T>> {
        let (tx, rx) = oneshot::channel();

        let mut entries = self.entries.lock();
        if entries.contains_key(unique_id) {
            return Err(OcppError::DuplicateId(unique_id.to_string()));
        }
        entries.insert(
            unique_id.to_string(),
            PendingRequest {
                action: action.to_string(),
                tx,
            },
        );
        drop(entries);

        Ok(PromiseHandle {
            unique_id: unique_id.to_string(),
            rx,
            repository: self.clone(),
            finished: false,
        })
    }

    /// Resolve a pending call with its reply.
    ///
    /// Returns `false` if `unique_id` is not pending (late or duplicate reply).
    pub fn complete(&self, unique_id: &str, value: T) -> bool {
        self.resolve(unique_id, Ok(value))
    }

    /// Resolve a pending call with an error.
    ///
    /// Returns `false` if `unique_id` is not pending.
    pub fn fail(&self, unique_id: &str, error: OcppError) -> bool {
        self.resolve(unique_id, Err(error))
    }

    /// Drop a pending entry without resolving it. Idempotent.
    pub fn remove(&self, unique_id: &str) -> bool {
        self.entries.lock().remove(unique_id).is_some()
    }

    /// Action recorded when `unique_id` was created.
    pub fn action_of(&self, unique_id: &str) -> Option<String> {
        self.entries.lock().get(unique_id).map(|e| e.action.clone())
    }

    /// Whether `unique_id` is pending.
    pub fn contains(&self, unique_id: &str) -> bool {
        self.entries.lock().contains_key(unique_id)
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, unique_id: &str, outcome: Result<T>) -> bool {
        let Some(entry) = self.entries.lock().remove(unique_id) else {
            return false;
        };
        // Receiver may already be gone; the entry is removed either way.
        let _ = entry.tx.send(outcome);
        true
    }
}

/// Caller's side of a pending call.
///
/// Resolves to the reply or error. Removes its repository entry when it
/// resolves or is dropped.
pub struct PromiseHandle<T> {
    unique_id: String,
    rx: oneshot::Receiver<Result<T>>,
    repository: PromiseRepository<T>,
    finished: bool,
}

impl<T> PromiseHandle<T> {
    /// Unique id this handle waits for.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.repository.remove(&self.unique_id);
        }
    }
}

impl<T> Future for PromiseHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(outcome) => {
                this.finish();
                Poll::Ready(outcome.unwrap_or(Err(OcppError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for PromiseHandle<T> {
    fn drop(&mut self) {
        self.finish();
    }
}
