//! Client contract
//!
//! A [`Client`] opens one connection per worker against that worker's node;
//! the connection turns invocations into completions. `invoke` may fail to
//! signal connection loss, which the worker records as an indeterminate
//! outcome rather than a test failure.

use anyhow::Result;
use async_trait::async_trait;
use shared::{Op, OpKind};

use crate::plan::TestRun;

/// Factory for per-worker client connections
#[async_trait]
pub trait Client: Send + Sync {
    /// Open a connection bound to a node
    ///
    /// `node` is `None` on zero-node dry runs.
    async fn open(&self, run: &TestRun, node: Option<&str>) -> Result<Box<dyn ClientConn>>;
}

/// One open client connection
#[async_trait]
pub trait ClientConn: Send {
    /// Apply an invocation, returning its completion
    ///
    /// The completion must be typed `ok`, `fail` or `info` and preserve the
    /// invocation's `process` and `f`. An `Err` means the connection failed
    /// and the outcome is unknown.
    async fn invoke(&mut self, run: &TestRun, op: Op) -> Result<Op>;

    /// Close the connection
    async fn close(&mut self, run: &TestRun) -> Result<()>;

    /// Whether this connection can be closed and replaced
    ///
    /// Connections that return `false` keep serving after an indeterminate
    /// outcome; that path is deprecated and the worker warns about it.
    fn closable(&self) -> bool {
        true
    }
}

/// Client that acknowledges every operation
///
/// Completes each invocation as `ok`, echoing its value. Useful for dry runs
/// and orchestration tests where only the harness itself is under scrutiny.
#[derive(Debug, Clone, Default)]
pub struct EchoClient;

#[async_trait]
impl Client for EchoClient {
    async fn open(&self, _run: &TestRun, node: Option<&str>) -> Result<Box<dyn ClientConn>> {
        tracing::debug!(node = node.unwrap_or("-"), "Opened echo client");
        Ok(Box::new(EchoConn))
    }
}

struct EchoConn;

#[async_trait]
impl ClientConn for EchoConn {
    async fn invoke(&mut self, _run: &TestRun, op: Op) -> Result<Op> {
        Ok(op.complete(OpKind::Ok))
    }

    async fn close(&mut self, _run: &TestRun) -> Result<()> {
        Ok(())
    }
}
