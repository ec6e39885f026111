//! Inter-step messaging, independent of graph execution.
//!
//! Messages are typed, prioritized, and immutable after enqueue.
//! Ordering is priority first, then enqueue order (FIFO) within a
//! priority tier. The queue serializes concurrent producers behind an
//! internal mutex.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use crate::error::EngineError;

/// Kind of message, for routing and handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Request for action.
    Request,
    /// Response to a request.
    Response,
    /// Informational, no response needed.
    Notification,
    /// Task transfer to another step.
    Handoff,
}

/// Priority level for queue ordering. Higher drains first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low = 1,
    Normal = 2,
    High = 3,
}

/// Structured message between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub kind: MessageKind,
    pub priority: MessagePriority,
    pub payload: Value,
}

impl AgentMessage {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        kind: MessageKind,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            kind,
            priority: MessagePriority::Normal,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }
}

struct QueueEntry {
    message: AgentMessage,
    seq: u64,
}

struct QueueInner {
    entries: Vec<QueueEntry>,
    next_seq: u64,
}

/// Priority queue for step messages. Unbounded by default; a capacity
/// bound turns overflow into `QueueFull`.
pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    capacity: Option<usize>,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: Vec::new(),
                next_seq: 0,
            }),
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: Vec::new(),
                next_seq: 0,
            }),
            capacity: Some(capacity),
        }
    }

    pub fn enqueue(&self, message: AgentMessage) -> Result<(), EngineError> {
        let mut inner = self.lock()?;
        if let Some(capacity) = self.capacity {
            if inner.entries.len() >= capacity {
                return Err(EngineError::QueueFull { capacity });
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(QueueEntry { message, seq });
        Ok(())
    }

    /// Remove and return the highest-priority, earliest-enqueued
    /// message.
    pub fn dequeue(&self) -> Result<AgentMessage, EngineError> {
        let mut inner = self.lock()?;
        let index = best_index(&inner.entries).ok_or(EngineError::QueueEmpty)?;
        Ok(inner.entries.remove(index).message)
    }

    /// View the next message without removing it.
    pub fn peek(&self) -> Result<AgentMessage, EngineError> {
        let inner = self.lock()?;
        let index = best_index(&inner.entries).ok_or(EngineError::QueueEmpty)?;
        Ok(inner.entries[index].message.clone())
    }

    /// Non-destructive snapshot of all messages for one receiver, in
    /// global priority/FIFO order.
    pub fn peek_for(&self, receiver: &str) -> Result<Vec<AgentMessage>, EngineError> {
        let inner = self.lock()?;
        let mut matched: Vec<(&QueueEntry, u64)> = inner
            .entries
            .iter()
            .filter(|e| e.message.receiver == receiver)
            .map(|e| (e, e.seq))
            .collect();
        matched.sort_by(|(a, _), (b, _)| {
            b.message
                .priority
                .cmp(&a.message.priority)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(matched.into_iter().map(|(e, _)| e.message.clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueInner>, EngineError> {
        self.inner
            .lock()
            .map_err(|e| EngineError::Internal(format!("queue lock poisoned: {}", e)))
    }
}

/// Index of the highest-priority entry, earliest seq as tie-break.
fn best_index(entries: &[QueueEntry]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.message
                .priority
                .cmp(&b.message.priority)
                .then(b.seq.cmp(&a.seq))
        })
        .map(|(i, _)| i)
}
