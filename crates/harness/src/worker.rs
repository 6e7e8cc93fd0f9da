//! Worker: one logical process driven through the generator
//!
//! Each worker owns exactly one live process id at a time and appends both
//! sides of every operation to the case history itself, which is what makes
//! the single-threaded-process invariant hold: at any instant at most one
//! in-flight operation carries a given process id.

use anyhow::{bail, Context, Result};
use shared::{Op, OpKind, Process};
use std::sync::Arc;

use crate::barrier::PhaseBarrier;
use crate::client::ClientConn;
use crate::history::History;
use crate::plan::TestRun;

pub(crate) struct Worker {
    run: Arc<TestRun>,
    history: History,
    barrier: PhaseBarrier,
    id: u64,
    node: Option<String>,
}

impl Worker {
    pub(crate) fn new(
        run: Arc<TestRun>,
        history: History,
        barrier: PhaseBarrier,
        id: u64,
        node: Option<String>,
    ) -> Self {
        Self {
            run,
            history,
            barrier,
            id,
            node,
        }
    }

    /// Drive this worker through a whole case
    ///
    /// Both barriers are reached on every path, even when the client fails
    /// to open or the op loop errors, so peers never hang; a captured error
    /// is rethrown only after the client is closed.
    pub(crate) async fn run(self) -> Result<()> {
        let opened = self
            .run
            .client
            .open(&self.run, self.node.as_deref())
            .await
            .with_context(|| format!("worker {} failed to open client", self.id));

        // No worker issues operations until every worker has a client.
        self.barrier.wait().await;

        let (mut conn, loop_result) = match opened {
            Ok(mut conn) => {
                let result = self.op_loop(&mut conn).await;
                (Some(conn), result)
            }
            Err(e) => (None, Err(e)),
        };

        // No worker disconnects until every worker is done.
        self.barrier.wait().await;

        if let Some(conn) = conn.as_mut() {
            if let Err(e) = conn.close(&self.run).await {
                tracing::warn!(worker = self.id, error = %format!("{e:#}"), "Client close failed");
            }
        }

        loop_result
    }

    async fn op_loop(&self, conn: &mut Box<dyn ClientConn>) -> Result<()> {
        let mut process = Process::Worker(self.id);

        loop {
            let Some(op) = self
                .run
                .generator
                .next(&self.run, process)
                .await
                .with_context(|| format!("generator failed for process {process}"))?
            else {
                tracing::debug!(worker = self.id, process = %process, "Generator exhausted");
                break;
            };

            let invocation = op
                .with_process(process)
                .with_kind(OpKind::Invoke)
                .stamped(self.run.relative_time());
            self.history.append(invocation.clone());
            tracing::info!(process = %process, f = %invocation.f, "invoke");

            match conn.invoke(&self.run, invocation.clone()).await {
                Ok(completion) => {
                    validate_completion(&invocation, &completion)?;
                    let completion = completion.stamped(self.run.relative_time());
                    tracing::info!(
                        process = %process,
                        f = %completion.f,
                        outcome = %completion.kind,
                        "complete"
                    );
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_op(&completion.f, completion.kind);

                    let indeterminate = completion.kind == OpKind::Info;
                    self.history.append(completion);

                    if indeterminate {
                        process = self.rotate(conn, process).await?;
                    }
                }
                Err(e) => {
                    // Connection failure: the effect may or may not have
                    // happened, so this is indeterminate rather than fatal.
                    let info = invocation
                        .complete(OpKind::Info)
                        .with_error(format!("indeterminate: {e:#}"))
                        .stamped(self.run.relative_time());
                    tracing::warn!(
                        process = %process,
                        f = %info.f,
                        error = %format!("{e:#}"),
                        "Client invocation failed; recorded indeterminate outcome"
                    );
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_op(&info.f, OpKind::Info);
                    self.history.append(info);

                    process = self.rotate(conn, process).await?;
                }
            }
        }

        Ok(())
    }

    /// Retire the process id after an indeterminate outcome
    ///
    /// A fresh id means a possible straggling effect of the old one can
    /// never be confused with a new operation. Closable clients get replaced
    /// so stale connection state goes with them.
    async fn rotate(
        &self,
        conn: &mut Box<dyn ClientConn>,
        process: Process,
    ) -> Result<Process> {
        let next = process.retire(self.run.concurrency as u64);
        tracing::info!(retired = %process, process = %next, "Retired process");
        #[cfg(feature = "metrics")]
        crate::metrics::record_process_retirement();

        if conn.closable() {
            if let Err(e) = conn.close(&self.run).await {
                tracing::warn!(worker = self.id, error = %format!("{e:#}"), "Client close failed");
            }
            *conn = self
                .run
                .client
                .open(&self.run, self.node.as_deref())
                .await
                .with_context(|| {
                    format!("worker {} failed to reopen client for process {next}", self.id)
                })?;
        } else {
            tracing::warn!(
                worker = self.id,
                process = %next,
                "Client is not closable; retired process keeps its connection (deprecated)"
            );
        }

        Ok(next)
    }
}

fn validate_completion(invocation: &Op, completion: &Op) -> Result<()> {
    if completion.kind == OpKind::Invoke {
        bail!(
            "client returned an invoke-typed record as the completion of {}",
            invocation.f
        );
    }
    if !invocation.completes(completion) {
        bail!(
            "client completion does not match its invocation: expected process {} f {}, got process {} f {}",
            invocation.process,
            invocation.f,
            completion.process,
            completion.f
        );
    }
    Ok(())
}
