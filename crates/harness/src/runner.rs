//! Top-level runner: end-to-end orchestration of a test
//!
//! Connects the session pool, builds the runtime state, walks the OS and DB
//! stages, runs the case, indexes the history, invokes the checker safely
//! and persists snapshots for named tests. Sessions are released on every
//! exit path; a setup failure propagates without ever reaching the checker.

use anyhow::{Context, Result};
use shared::{Config, Op, Process, Store};
use std::sync::Arc;

use crate::case::run_case;
use crate::checker::check_safely;
use crate::db::with_db;
use crate::history::index_history;
use crate::nemesis::Nemesis;
use crate::os::with_os;
use crate::plan::{TestPlan, TestReport, TestRun};
use crate::session::SessionPool;

/// Run a test plan to completion, returning the final report
pub async fn run(plan: TestPlan, config: &Config) -> Result<TestReport> {
    tracing::info!(
        name = plan.name.as_deref().unwrap_or("<unnamed>"),
        nodes = plan.nodes.len(),
        concurrency = plan.resolved_concurrency(),
        "Starting test run"
    );

    let sessions = SessionPool::connect(plan.transport.as_ref(), &config.ssh, &plan.nodes)
        .await
        .context("failed to establish node sessions")?;

    let run = Arc::new(TestRun::new(&plan, sessions));
    let nemesis = plan.nemesis;

    let outcome = execute(&run, nemesis, config).await;

    // Sessions are released whether the body succeeded or not.
    run.sessions.close_all().await;

    let (history, store) = outcome?;

    let mut report = TestReport {
        name: run.name.clone(),
        start: run.start,
        nodes: run.nodes.clone(),
        concurrency: run.concurrency,
        model: run.model.clone(),
        history,
        results: None,
    };

    if let Some(store) = &store {
        store
            .write_json("test.json", &report)
            .await
            .context("failed to persist pre-analysis snapshot")?;
    }

    report.history = index_history(report.history);

    let results = check_safely(run.checker.as_ref(), &run, &run.model, &report.history).await;
    let valid = results.valid;
    let error = results.error.clone();
    report.results = Some(results);

    if let Some(store) = &store {
        store
            .write_json("test.json", &report)
            .await
            .context("failed to persist final snapshot")?;
        if let Some(results) = &report.results {
            store
                .write_json("results.json", results)
                .await
                .context("failed to persist analysis results")?;
        }
    }

    if valid {
        tracing::info!(ops = report.history.len(), "Test run complete: everything looks good");
    } else {
        tracing::warn!(
            ops = report.history.len(),
            error = error.as_deref().unwrap_or("-"),
            "Test run complete: analysis found problems"
        );
    }

    Ok(report)
}

/// The scoped body of a run: store, stages and the case itself
async fn execute(
    run: &Arc<TestRun>,
    nemesis: Box<dyn Nemesis>,
    config: &Config,
) -> Result<(Vec<Op>, Option<Store>)> {
    let store = match &run.name {
        Some(name) => Some(
            Store::open(&config.store, name, run.start)
                .await
                .context("failed to open store")?,
        ),
        None => None,
    };

    let history = with_os(
        run.as_ref(),
        with_db(run.as_ref(), store.as_ref(), async {
            announce_processes(run.as_ref()).await?;
            run_case(run, nemesis, store.as_ref()).await
        }),
    )
    .await?;

    Ok((history, store))
}

/// Hand the generator the known process set before workers start
async fn announce_processes(run: &TestRun) -> Result<()> {
    let mut processes = vec![Process::Nemesis];
    processes.extend((0..run.concurrency).map(|id| Process::Worker(id as u64)));

    run.generator
        .announce(run, &processes)
        .await
        .context("generator announce failed")
}
