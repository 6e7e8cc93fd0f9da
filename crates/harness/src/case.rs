//! Case runner: nemesis plus workers over one history
//!
//! A case owns a fresh history, registers it for nemesis fan-out, runs every
//! worker to completion inside the nemesis scope, collects node logs, and
//! returns the closed history. Indices are assigned later by the runner.

use anyhow::{anyhow, Result};
use shared::{Op, Store};
use std::sync::Arc;

use crate::barrier::PhaseBarrier;
use crate::history::History;
use crate::nemesis::{with_nemesis, Nemesis};
use crate::plan::TestRun;
use crate::snarf::snarf_logs;
use crate::worker::Worker;

/// Run one test case, returning its history
pub async fn run_case(
    run: &Arc<TestRun>,
    nemesis: Box<dyn Nemesis>,
    store: Option<&Store>,
) -> Result<Vec<Op>> {
    let history = History::new();
    run.active.register(&history);

    let result = with_nemesis(run, nemesis, run_workers(run, &history)).await;

    // Collect whatever the nodes wrote, success or failure. A failed
    // collection is logged but cannot overturn the case outcome.
    if let Some(store) = store {
        if let Err(e) = snarf_logs(run, store).await {
            tracing::error!(error = %format!("{e:#}"), "Log collection failed");
        }
    }

    run.active.unregister(&history);

    result?;

    Ok(history.close())
}

async fn run_workers(run: &Arc<TestRun>, history: &History) -> Result<()> {
    let barrier = PhaseBarrier::new(run.concurrency);

    tracing::info!(workers = run.concurrency, "Spawning workers");
    #[cfg(feature = "metrics")]
    crate::metrics::set_active_workers(run.concurrency);

    let handles: Vec<_> = (0..run.concurrency)
        .map(|id| {
            let worker = Worker::new(
                run.clone(),
                history.clone(),
                barrier.clone(),
                id as u64,
                run.node_for_worker(id).map(str::to_string),
            );
            tokio::spawn(worker.run())
        })
        .collect();

    // Every worker finishes before the first failure propagates.
    let mut first_err = None;
    for (id, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("worker {id} panicked: {e}")),
        };
        if let Err(e) = outcome {
            tracing::error!(worker = id, error = %format!("{e:#}"), "Worker failed");
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    #[cfg(feature = "metrics")]
    crate::metrics::set_active_workers(0);

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
