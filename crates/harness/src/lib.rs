//! Test orchestration core for the faultline distributed-systems tester
//!
//! The harness drives a fleet of single-threaded logical clients in lock-step
//! across remote nodes, runs a fault-injection nemesis alongside them,
//! interleaves every invocation and completion into a single append-only
//! history, and hands that history to a checker. All collaborators (OS, DB,
//! client, generator, nemesis, checker, remote transport) are pluggable
//! trait objects; the harness owns supervision, phase coordination and
//! resource lifecycle.

pub mod barrier;
pub mod case;
pub mod checker;
pub mod client;
pub mod db;
pub mod error;
pub mod generator;
pub mod history;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod nemesis;
pub mod os;
pub mod plan;
pub mod runner;
pub mod session;
pub mod snarf;
pub mod worker;

mod fanout;

// Re-export commonly used types
pub use barrier::PhaseBarrier;
pub use checker::{check_safely, CheckResult, Checker, OptimisticChecker};
pub use client::{Client, ClientConn, EchoClient};
pub use db::{Db, LogFiles, NoopDb, Primary};
pub use error::{HarnessError, SessionResult};
pub use generator::{FixedGenerator, Generator};
pub use history::{index_history, ActiveHistories, History};
pub use nemesis::{Nemesis, NoopNemesis};
pub use os::{NoopOs, Os};
pub use plan::{TestPlan, TestReport, TestRun};
pub use runner::run;
pub use session::{LocalTransport, NodeSession, SessionFactory, SessionPool};
