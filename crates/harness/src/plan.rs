//! Test plans, runtime state and final reports
//!
//! A [`TestPlan`] is the immutable input to the runner: the node list, the
//! desired concurrency and the pluggable collaborators. The runner augments
//! it into a [`TestRun`] (sessions, barrier, clocks, active-history set) that
//! is handed to every collaborator, and produces a serializable
//! [`TestReport`] at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::barrier::PhaseBarrier;
use crate::checker::{CheckResult, Checker, OptimisticChecker};
use crate::client::{Client, EchoClient};
use crate::db::{Db, NoopDb};
use crate::generator::{FixedGenerator, Generator};
use crate::history::ActiveHistories;
use crate::nemesis::{Nemesis, NoopNemesis};
use crate::os::{NoopOs, Os};
use crate::session::{LocalTransport, SessionFactory, SessionPool};
use shared::Op;

/// Immutable input to a test run
pub struct TestPlan {
    /// Name for persistence; unnamed tests are not persisted
    pub name: Option<String>,
    /// Ordered node identifiers
    pub nodes: Vec<String>,
    /// Number of logical clients; defaults to the node count
    pub concurrency: Option<usize>,
    /// Model handed through to the checker
    pub model: serde_json::Value,
    /// Remote shell transport
    pub transport: Arc<dyn SessionFactory>,
    /// OS prerequisites
    pub os: Arc<dyn Os>,
    /// Database under test
    pub db: Arc<dyn Db>,
    /// Client opened per worker
    pub client: Arc<dyn Client>,
    /// Operation source
    pub generator: Arc<dyn Generator>,
    /// Fault-injection actor
    pub nemesis: Box<dyn Nemesis>,
    /// History verifier
    pub checker: Arc<dyn Checker>,
}

impl TestPlan {
    /// A plan with no-op collaborators, suitable for dry runs
    ///
    /// Callers replace the collaborators they care about.
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            name: None,
            nodes,
            concurrency: None,
            model: serde_json::Value::Null,
            transport: Arc::new(LocalTransport),
            os: Arc::new(NoopOs),
            db: Arc::new(NoopDb),
            client: Arc::new(EchoClient),
            generator: Arc::new(FixedGenerator::new(Vec::<Op>::new())),
            nemesis: Box::new(NoopNemesis),
            checker: Arc::new(OptimisticChecker),
        }
    }

    /// Effective worker count
    pub fn resolved_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(self.nodes.len())
    }
}

impl fmt::Debug for TestPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestPlan")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Runtime state of a running test
///
/// Built once by the runner and shared read-only with every collaborator.
pub struct TestRun {
    /// Test name, if any
    pub name: Option<String>,
    /// Ordered node identifiers
    pub nodes: Vec<String>,
    /// Effective worker count
    pub concurrency: usize,
    /// Model handed through to the checker
    pub model: serde_json::Value,
    /// Wall-clock start of the run
    pub start: DateTime<Utc>,
    /// Per-node shell sessions
    pub sessions: SessionPool,
    /// Node barrier for collaborators that coordinate across nodes
    pub barrier: PhaseBarrier,
    /// Histories currently receiving nemesis events
    pub active: ActiveHistories,
    /// OS prerequisites
    pub os: Arc<dyn Os>,
    /// Database under test
    pub db: Arc<dyn Db>,
    /// Client opened per worker
    pub client: Arc<dyn Client>,
    /// Operation source
    pub generator: Arc<dyn Generator>,
    /// History verifier
    pub checker: Arc<dyn Checker>,

    origin: Instant,
}

impl TestRun {
    /// Build runtime state from a plan and an established session pool
    pub fn new(plan: &TestPlan, sessions: SessionPool) -> Self {
        Self {
            name: plan.name.clone(),
            nodes: plan.nodes.clone(),
            concurrency: plan.resolved_concurrency(),
            model: plan.model.clone(),
            start: Utc::now(),
            sessions,
            barrier: PhaseBarrier::new(plan.nodes.len()),
            active: ActiveHistories::default(),
            os: plan.os.clone(),
            db: plan.db.clone(),
            client: plan.client.clone(),
            generator: plan.generator.clone(),
            checker: plan.checker.clone(),
            origin: Instant::now(),
        }
    }

    /// Monotonic nanoseconds since the run started
    pub fn relative_time(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    /// Node assigned to a worker id, round-robin
    ///
    /// `None` when the node list is empty (zero-node dry runs).
    pub fn node_for_worker(&self, worker: usize) -> Option<&str> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.nodes[worker % self.nodes.len()].as_str())
        }
    }

    /// First node, used for primary-only database setup
    pub fn primary_node(&self) -> Option<&str> {
        self.nodes.first().map(|s| s.as_str())
    }
}

/// Serializable record of a finished test
///
/// Runtime-only state (sessions, barriers, collaborators) never appears
/// here, which is what makes the report safe to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Test name, if any
    pub name: Option<String>,
    /// Wall-clock start of the run
    pub start: DateTime<Utc>,
    /// Nodes the test ran against
    pub nodes: Vec<String>,
    /// Effective worker count
    pub concurrency: usize,
    /// Model handed to the checker
    pub model: serde_json::Value,
    /// The recorded history
    pub history: Vec<Op>,
    /// Checker verdict, absent until analysis has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<CheckResult>,
}

impl TestReport {
    /// Whether analysis ran and passed
    pub fn is_valid(&self) -> bool {
        self.results.as_ref().map(|r| r.valid).unwrap_or(false)
    }
}
