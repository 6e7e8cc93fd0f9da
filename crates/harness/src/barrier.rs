//! Reusable N-way rendezvous for phase coordination
//!
//! Workers meet at a barrier twice per case: after opening their clients and
//! before closing them, so no worker issues operations while a peer is still
//! connecting, and none disconnects while a peer is still working.

use std::sync::Arc;
use tokio::sync::Barrier;

/// N-way rendezvous with a no-op sentinel
///
/// Zero-node tests still need every `wait()` call site to work; the sentinel
/// short-circuits each arrival to an immediate release so degenerate dry runs
/// pass straight through.
#[derive(Debug, Clone)]
pub struct PhaseBarrier {
    inner: Option<Arc<Barrier>>,
}

impl PhaseBarrier {
    /// Create a barrier for `parties` participants
    ///
    /// Zero parties yields the no-op sentinel.
    pub fn new(parties: usize) -> Self {
        if parties == 0 {
            Self::none()
        } else {
            Self {
                inner: Some(Arc::new(Barrier::new(parties))),
            }
        }
    }

    /// The no-op sentinel: every arrival succeeds immediately
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// Whether this is the no-op sentinel
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Block until every participant has arrived
    pub async fn wait(&self) {
        if let Some(barrier) = &self.inner {
            barrier.wait().await;
        }
    }
}
