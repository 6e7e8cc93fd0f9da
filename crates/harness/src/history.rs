//! Append-only operation histories and the active-history registry
//!
//! Every worker appends its own invocations and completions to the current
//! case's history; the nemesis fans each of its events into every history
//! registered as active. After a case ends the history is closed and each
//! entry receives its final index in append order.

use shared::Op;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Append-only sequence of operations with concurrent writers
#[derive(Debug, Clone)]
pub struct History {
    id: Uuid,
    ops: Arc<Mutex<Vec<Op>>>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Identity of this history, stable across clones
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Atomically append an operation, returning it unchanged
    pub fn append(&self, op: Op) -> Op {
        self.ops.lock().unwrap().push(op.clone());
        op
    }

    /// Number of recorded operations
    pub fn len(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.ops.lock().unwrap().is_empty()
    }

    /// Clone the current contents
    pub fn snapshot(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Drain the history into its final op sequence
    pub fn close(&self) -> Vec<Op> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign each entry a strictly increasing index in existing order
pub fn index_history(mut ops: Vec<Op>) -> Vec<Op> {
    for (i, op) in ops.iter_mut().enumerate() {
        op.index = Some(i as u64);
    }
    ops
}

/// Registry of histories currently accepting nemesis writes
///
/// Membership changes only at case boundaries. The nemesis takes one
/// [`snapshot`](Self::snapshot) per event and fans both the invocation and
/// the completion into exactly that set.
#[derive(Debug, Clone, Default)]
pub struct ActiveHistories {
    inner: Arc<Mutex<Vec<History>>>,
}

impl ActiveHistories {
    /// Add a history to the active set
    pub fn register(&self, history: &History) {
        self.inner.lock().unwrap().push(history.clone());
    }

    /// Remove a history from the active set
    pub fn unregister(&self, history: &History) {
        self.inner.lock().unwrap().retain(|h| h.id != history.id);
    }

    /// The membership at one instant
    pub fn snapshot(&self) -> Vec<History> {
        self.inner.lock().unwrap().clone()
    }
}
