//! Operation generators
//!
//! A generator is the shared source of operations for every worker and the
//! nemesis, keyed by logical process. Returning `Ok(None)` ends the stream
//! for that process. Implementations must be safe under concurrent calls
//! from all workers and the nemesis at once.

use anyhow::Result;
use async_trait::async_trait;
use shared::{Op, Process};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::plan::TestRun;

/// Source of operations for workers and the nemesis
#[async_trait]
pub trait Generator: Send + Sync {
    /// Announce the known process set before workers start
    ///
    /// Receives `{nemesis} ∪ {0..concurrency-1}` so coordinating generators
    /// can size their bookkeeping up front.
    async fn announce(&self, run: &TestRun, processes: &[Process]) -> Result<()> {
        let _ = (run, processes);
        Ok(())
    }

    /// Next operation for a process, or `None` to end its stream
    async fn next(&self, run: &TestRun, process: Process) -> Result<Option<Op>>;
}

/// Fixed schedule of operations, handed out first-come first-served
///
/// Worker processes drain one queue, the nemesis another. Useful for tests
/// and dry runs; real workloads implement [`Generator`] directly.
#[derive(Debug, Default)]
pub struct FixedGenerator {
    worker_ops: Mutex<VecDeque<Op>>,
    nemesis_ops: Mutex<VecDeque<Op>>,
}

impl FixedGenerator {
    /// A schedule for worker processes only
    pub fn new(ops: impl IntoIterator<Item = Op>) -> Self {
        Self {
            worker_ops: Mutex::new(ops.into_iter().collect()),
            nemesis_ops: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a nemesis schedule
    pub fn with_nemesis_ops(self, ops: impl IntoIterator<Item = Op>) -> Self {
        Self {
            nemesis_ops: Mutex::new(ops.into_iter().collect()),
            ..self
        }
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn next(&self, _run: &TestRun, process: Process) -> Result<Option<Op>> {
        let queue = match process {
            Process::Nemesis => &self.nemesis_ops,
            Process::Worker(_) => &self.worker_ops,
        };
        Ok(queue.lock().unwrap().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TestPlan;
    use crate::session::SessionPool;

    fn dry_run() -> TestRun {
        TestRun::new(&TestPlan::new(Vec::new()), SessionPool::empty())
    }

    #[tokio::test]
    async fn test_fixed_generator_drains_then_ends() {
        let run = dry_run();
        let gen = FixedGenerator::new(vec![Op::op("read"), Op::op("write")]);

        let first = gen.next(&run, Process::Worker(0)).await.unwrap().unwrap();
        assert_eq!(first.f, "read");
        let second = gen.next(&run, Process::Worker(1)).await.unwrap().unwrap();
        assert_eq!(second.f, "write");
        assert!(gen.next(&run, Process::Worker(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nemesis_queue_is_separate() {
        let run = dry_run();
        let gen = FixedGenerator::new(vec![Op::op("read")])
            .with_nemesis_ops(vec![Op::op("partition")]);

        let nem = gen.next(&run, Process::Nemesis).await.unwrap().unwrap();
        assert_eq!(nem.f, "partition");
        assert!(gen.next(&run, Process::Nemesis).await.unwrap().is_none());

        // Worker queue untouched by nemesis draws
        let op = gen.next(&run, Process::Worker(0)).await.unwrap().unwrap();
        assert_eq!(op.f, "read");
    }

    #[tokio::test]
    async fn test_empty_generator() {
        let run = dry_run();
        let gen = FixedGenerator::default();
        assert!(gen.next(&run, Process::Worker(0)).await.unwrap().is_none());
        assert!(gen.next(&run, Process::Nemesis).await.unwrap().is_none());
    }
}
