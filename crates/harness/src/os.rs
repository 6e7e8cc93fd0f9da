//! OS stage
//!
//! Installs OS-level prerequisites on every node before the body and removes
//! them afterwards regardless of outcome. Setup and teardown fan out in
//! parallel across nodes.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::future::Future;

use crate::fanout::join_first_error;
use crate::plan::TestRun;

/// OS-level prerequisites on a node
#[async_trait]
pub trait Os: Send + Sync {
    /// Install prerequisites on a node
    async fn setup(&self, run: &TestRun, node: &str) -> Result<()>;

    /// Remove prerequisites from a node
    async fn teardown(&self, run: &TestRun, node: &str) -> Result<()>;
}

/// OS stage that touches nothing
#[derive(Debug, Clone, Default)]
pub struct NoopOs;

#[async_trait]
impl Os for NoopOs {
    async fn setup(&self, _run: &TestRun, node: &str) -> Result<()> {
        tracing::debug!(node = %node, "Noop OS setup");
        Ok(())
    }

    async fn teardown(&self, _run: &TestRun, node: &str) -> Result<()> {
        tracing::debug!(node = %node, "Noop OS teardown");
        Ok(())
    }
}

/// Run a body between OS setup and teardown on every node
///
/// Teardown runs on all nodes whether the body succeeds, fails, or setup
/// itself failed part-way; teardown errors are logged and swallowed so they
/// never mask the primary error.
pub async fn with_os<T, F>(run: &TestRun, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tracing::info!(nodes = run.nodes.len(), "Setting up OS");

    if let Err(e) = join_first_error(run.nodes.iter().map(|node| run.os.setup(run, node))).await {
        teardown_all(run).await;
        return Err(e.context("OS setup failed"));
    }

    let result = body.await;

    teardown_all(run).await;

    result
}

async fn teardown_all(run: &TestRun) {
    tracing::info!(nodes = run.nodes.len(), "Tearing down OS");

    let results = join_all(
        run.nodes
            .iter()
            .map(|node| async move { (node, run.os.teardown(run, node).await) }),
    )
    .await;

    for (node, result) in results {
        if let Err(e) = result {
            tracing::warn!(node = %node, error = %format!("{e:#}"), "OS teardown failed");
        }
    }
}
