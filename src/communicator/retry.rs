//! FIFO queue of transaction-related calls waiting for a connection.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;

/// An encoded call waiting to be sent.
#[derive(Debug, Clone)]
pub struct QueuedCall {
    pub unique_id: String,
    pub action: String,
    /// Encoded frame, sent as-is on retry.
    pub frame: Bytes,
    pub enqueued_at: Instant,
}

impl QueuedCall {
    /// Queue entry for an encoded frame.
    pub fn new(unique_id: impl Into<String>, action: impl Into<String>, frame: Bytes) -> Self {
        Self {
            unique_id: unique_id.into(),
            action: action.into(),
            frame,
            enqueued_at: Instant::now(),
        }
    }
}

/// Calls in arrival order. Only the head is ever retried.
#[derive(Debug, Default)]
pub struct RetryQueue {
    calls: VecDeque<QueuedCall>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: QueuedCall) {
        self.calls.push_back(call);
    }

    /// Oldest call.
    pub fn head(&self) -> Option<&QueuedCall> {
        self.calls.front()
    }

    /// Remove the oldest call once it was accepted by the transport.
    pub fn pop(&mut self) -> Option<QueuedCall> {
        self.calls.pop_front()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Unique ids in send order.
    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.unique_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = RetryQueue::new();
        for id in ["A", "B", "C"] {
            queue.push(QueuedCall::new(id, "StartTransaction", Bytes::new()));
        }

        assert_eq!(queue.unique_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(queue.head().unwrap().unique_id, "A");
        assert_eq!(queue.pop().unwrap().unique_id, "A");
        assert_eq!(queue.head().unwrap().unique_id, "B");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_empty() {
        let mut queue = RetryQueue::new();
        assert!(queue.is_empty());
        assert!(queue.head().is_none());
        assert!(queue.pop().is_none());
    }
}
