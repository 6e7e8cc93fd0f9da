//! Remote shell sessions and the per-node session pool
//!
//! The transport itself is pluggable: the harness only requires something
//! that can run commands, download files and close. The pool establishes one
//! session per node in parallel and guarantees every session is released no
//! matter how the run ends.

use async_trait::async_trait;
use futures_util::future::join_all;
use shared::SshConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{HarnessError, SessionResult};

/// One established shell session to a node
#[async_trait]
pub trait NodeSession: Send + Sync {
    /// Run a shell command, returning stdout
    async fn exec(&self, cmd: &str) -> SessionResult<String>;

    /// Download a remote file to a local path
    async fn download(&self, remote: &str, dest: &Path) -> SessionResult<()>;

    /// Close the session
    async fn close(&self) -> SessionResult<()>;
}

/// Session transport, e.g. an SSH implementation
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Establish a session to a node
    async fn connect(&self, node: &str, ssh: &SshConfig) -> SessionResult<Box<dyn NodeSession>>;
}

/// One session per node, read-only after construction
pub struct SessionPool {
    sessions: HashMap<String, Arc<dyn NodeSession>>,
}

impl SessionPool {
    /// A pool with no sessions, for zero-node dry runs
    pub fn empty() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Connect to every node in parallel
    ///
    /// If any connect fails, all successfully-opened sessions are closed in
    /// parallel (best-effort) and the first failure propagates.
    pub async fn connect(
        factory: &dyn SessionFactory,
        ssh: &SshConfig,
        nodes: &[String],
    ) -> SessionResult<Self> {
        let results = join_all(nodes.iter().map(|node| async move {
            let session = factory.connect(node, ssh).await;
            (node.clone(), session)
        }))
        .await;

        let mut sessions: HashMap<String, Arc<dyn NodeSession>> = HashMap::new();
        let mut first_err = None;

        for (node, result) in results {
            match result {
                Ok(session) => {
                    sessions.insert(node, Arc::from(session));
                }
                Err(e) => {
                    tracing::error!(node = %node, error = %e, "Failed to establish session");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if let Some(err) = first_err {
            let pool = Self { sessions };
            pool.close_all().await;
            return Err(err);
        }

        tracing::info!(sessions = sessions.len(), "Session pool established");

        Ok(Self { sessions })
    }

    /// Session for a node, if the pool holds one
    pub fn get(&self, node: &str) -> Option<Arc<dyn NodeSession>> {
        self.sessions.get(node).cloned()
    }

    /// Number of established sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the pool holds no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session in parallel, best-effort
    ///
    /// Close failures are logged and swallowed so they never mask a primary
    /// error from the run body.
    pub async fn close_all(&self) {
        let results = join_all(self.sessions.iter().map(|(node, session)| async move {
            (node.clone(), session.close().await)
        }))
        .await;

        for (node, result) in results {
            if let Err(e) = result {
                tracing::warn!(node = %node, error = %e, "Session close failed");
            }
        }
    }
}

/// Local transport for dry runs and tests
///
/// Sessions run commands on the local machine through `sh` and treat
/// "remote" paths as paths on the local filesystem, so OS and DB
/// implementations work unchanged against localhost and log collection works
/// against files a test writes itself.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

#[async_trait]
impl SessionFactory for LocalTransport {
    async fn connect(&self, node: &str, _ssh: &SshConfig) -> SessionResult<Box<dyn NodeSession>> {
        Ok(Box::new(LocalSession {
            node: node.to_string(),
        }))
    }
}

struct LocalSession {
    node: String,
}

#[async_trait]
impl NodeSession for LocalSession {
    async fn exec(&self, cmd: &str) -> SessionResult<String> {
        tracing::debug!(node = %self.node, cmd = %cmd, "Local session exec");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .await
            .map_err(|e| HarnessError::exec(&self.node, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarnessError::exec(
                &self.node,
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn download(&self, remote: &str, dest: &Path) -> SessionResult<()> {
        match tokio::fs::copy(remote, dest).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HarnessError::file_missing(remote))
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(HarnessError::pipe_closed(e.to_string()))
            }
            Err(e) => Err(HarnessError::transfer(e.to_string())),
        }
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}
