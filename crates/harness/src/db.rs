//! DB stage
//!
//! Cycles the database (teardown, then a fresh setup) on every node before
//! the body, runs an optional primary-only setup against the first node, and
//! tears everything down afterwards. A failure anywhere inside the stage
//! triggers an emergency log collection before teardown so the forensic
//! evidence survives the cleanup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use shared::Store;
use std::future::Future;

use crate::fanout::join_first_error;
use crate::plan::TestRun;
use crate::snarf::snarf_logs;

/// Database under test
///
/// Optional capabilities are discovered through the `primary` and
/// `log_files` entries; the defaults advertise neither.
#[async_trait]
pub trait Db: Send + Sync {
    /// Install and start the database on a node
    async fn setup(&self, run: &TestRun, node: &str) -> Result<()>;

    /// Stop and remove the database from a node
    async fn teardown(&self, run: &TestRun, node: &str) -> Result<()>;

    /// Teardown then setup, yielding a clean instance
    async fn cycle(&self, run: &TestRun, node: &str) -> Result<()> {
        self.teardown(run, node).await?;
        self.setup(run, node).await
    }

    /// Primary-only setup capability
    fn primary(&self) -> Option<&dyn Primary> {
        None
    }

    /// Log-file advertisement capability
    fn log_files(&self) -> Option<&dyn LogFiles> {
        None
    }
}

/// Extra setup against the cluster's first node
#[async_trait]
pub trait Primary: Send + Sync {
    /// Run primary-only setup
    async fn setup_primary(&self, run: &TestRun, node: &str) -> Result<()>;
}

/// Advertises the log files worth collecting from a node
#[async_trait]
pub trait LogFiles: Send + Sync {
    /// Paths of the node's log files
    async fn log_files(&self, run: &TestRun, node: &str) -> Result<Vec<String>>;
}

/// DB stage that manages nothing
#[derive(Debug, Clone, Default)]
pub struct NoopDb;

#[async_trait]
impl Db for NoopDb {
    async fn setup(&self, _run: &TestRun, node: &str) -> Result<()> {
        tracing::debug!(node = %node, "Noop DB setup");
        Ok(())
    }

    async fn teardown(&self, _run: &TestRun, node: &str) -> Result<()> {
        tracing::debug!(node = %node, "Noop DB teardown");
        Ok(())
    }
}

/// Run a body between a database cycle and teardown on every node
///
/// On any failure during the cycle, the primary setup or the body, logs are
/// collected first, teardown still runs on every node, and the original
/// error propagates unchanged.
pub async fn with_db<T, F>(run: &TestRun, store: Option<&Store>, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Err(e) = stage_in(run).await {
        emergency_snarf(run, store).await;
        teardown_all(run).await;
        return Err(e);
    }

    let result = body.await;

    if result.is_err() {
        emergency_snarf(run, store).await;
    }

    teardown_all(run).await;

    result
}

async fn stage_in(run: &TestRun) -> Result<()> {
    tracing::info!(nodes = run.nodes.len(), "Cycling database");

    join_first_error(run.nodes.iter().map(|node| run.db.cycle(run, node)))
        .await
        .map_err(|e| e.context("DB cycle failed"))?;

    if let Some(primary) = run.db.primary() {
        if let Some(node) = run.primary_node() {
            tracing::info!(node = %node, "Running primary-only DB setup");
            primary
                .setup_primary(run, node)
                .await
                .with_context(|| format!("primary DB setup failed on {node}"))?;
        }
    }

    Ok(())
}

async fn emergency_snarf(run: &TestRun, store: Option<&Store>) {
    match store {
        Some(store) => {
            tracing::warn!("DB stage failed; collecting logs before teardown");
            if let Err(e) = snarf_logs(run, store).await {
                tracing::error!(error = %format!("{e:#}"), "Emergency log collection failed");
            }
        }
        None => {
            tracing::debug!("Unnamed test has no store; skipping emergency log collection");
        }
    }
}

async fn teardown_all(run: &TestRun) {
    tracing::info!(nodes = run.nodes.len(), "Tearing down database");

    let results = join_all(
        run.nodes
            .iter()
            .map(|node| async move { (node, run.db.teardown(run, node).await) }),
    )
    .await;

    for (node, result) in results {
        if let Err(e) = result {
            tracing::warn!(node = %node, error = %format!("{e:#}"), "DB teardown failed");
        }
    }
}
