//! Nemesis: the fault-injection actor and its supervisor
//!
//! The nemesis is one extra logical actor with the reserved `nemesis`
//! process id. It runs in its own task alongside the workers and fans every
//! event into all currently-active histories. It is best-effort by design:
//! a failing nemesis leaves a crash record behind and keeps going, because
//! halting fault injection must never halt the case.

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{Op, OpKind, Process};
use std::future::Future;
use std::sync::Arc;

use crate::history::History;
use crate::plan::TestRun;

/// Fault-injection actor
#[async_trait]
pub trait Nemesis: Send {
    /// Prepare the nemesis before workers begin
    async fn setup(&mut self, run: &TestRun) -> Result<()>;

    /// Apply one fault operation, returning its completion
    ///
    /// The completion must stay typed `info` and preserve the invocation's
    /// `process` and `f`.
    async fn invoke(&mut self, run: &TestRun, op: Op) -> Result<Op>;

    /// Undo whatever the nemesis left behind
    async fn teardown(&mut self, run: &TestRun) -> Result<()>;
}

/// Nemesis that injects nothing
#[derive(Debug, Clone, Default)]
pub struct NoopNemesis;

#[async_trait]
impl Nemesis for NoopNemesis {
    async fn setup(&mut self, _run: &TestRun) -> Result<()> {
        Ok(())
    }

    async fn invoke(&mut self, _run: &TestRun, op: Op) -> Result<Op> {
        Ok(op)
    }

    async fn teardown(&mut self, _run: &TestRun) -> Result<()> {
        Ok(())
    }
}

/// Run a body with the nemesis active alongside it
///
/// Setup happens before the body starts so the nemesis' effects are
/// reproducible; the supervisor task is awaited and the nemesis torn down on
/// every exit path. Teardown errors are logged, never masking the body's
/// outcome.
pub async fn with_nemesis<T, F>(
    run: &Arc<TestRun>,
    mut nemesis: Box<dyn Nemesis>,
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    nemesis
        .setup(run)
        .await
        .context("nemesis setup failed")?;

    let supervisor = tokio::spawn(nemesis_loop(run.clone(), nemesis));

    let result = body.await;

    match supervisor.await {
        Ok(mut nemesis) => {
            if let Err(e) = nemesis.teardown(run).await {
                tracing::warn!(error = %format!("{e:#}"), "Nemesis teardown failed");
            }
        }
        Err(e) => {
            // The nemesis value died with its task; nothing left to tear down.
            tracing::error!(error = %e, "Nemesis task panicked");
        }
    }

    result
}

async fn nemesis_loop(run: Arc<TestRun>, mut nemesis: Box<dyn Nemesis>) -> Box<dyn Nemesis> {
    loop {
        let op = match run.generator.next(&run, Process::Nemesis).await {
            Ok(Some(op)) => op,
            Ok(None) => {
                tracing::debug!("Generator exhausted for the nemesis");
                break;
            }
            Err(e) => {
                tracing::error!(
                    error = %format!("{e:#}"),
                    "Generator failed for the nemesis; stopping fault injection"
                );
                break;
            }
        };

        let invocation = op
            .with_process(Process::Nemesis)
            .with_kind(OpKind::Info)
            .stamped(run.relative_time());

        // One membership snapshot serves both fan-outs: the completion goes
        // to exactly the histories that saw the invocation.
        let targets = run.active.snapshot();

        fan_out(&targets, &invocation);
        tracing::info!(f = %invocation.f, "nemesis invoke");

        let completion = match nemesis.invoke(&run, invocation.clone()).await {
            Ok(completion)
                if completion.kind == OpKind::Info && invocation.completes(&completion) =>
            {
                completion.stamped(run.relative_time())
            }
            Ok(completion) => invocation
                .clone()
                .with_error(format!(
                    "crashed: completion did not preserve the invocation (got {} {})",
                    completion.kind, completion.f
                ))
                .stamped(run.relative_time()),
            Err(e) => {
                tracing::warn!(
                    f = %invocation.f,
                    error = %format!("{e:#}"),
                    "Nemesis invocation failed; continuing"
                );
                invocation
                    .clone()
                    .with_error(format!("crashed: {e:#}"))
                    .stamped(run.relative_time())
            }
        };

        tracing::info!(f = %completion.f, "nemesis complete");
        #[cfg(feature = "metrics")]
        crate::metrics::record_nemesis_event();
        fan_out(&targets, &completion);
    }

    nemesis
}

fn fan_out(targets: &[History], op: &Op) {
    for history in targets {
        history.append(op.clone());
    }
}
