//! Shared collaborators for harness integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use harness::{
    Client, ClientConn, Db, Generator, LogFiles, NodeSession, Os, SessionFactory, TestRun,
};
use shared::{Config, Op, OpKind, Process, SshConfig, StoreConfig};

/// Config pointing the store at a temp directory
pub fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        store: StoreConfig {
            root: dir.path().display().to_string(),
        },
        ssh: SshConfig::default(),
    }
}

/// Scripted outcome for one client invocation
#[derive(Debug, Clone)]
pub enum Script {
    /// Complete as ok
    Ok,
    /// Complete as fail with an error
    Fail(String),
    /// Complete as info (indeterminate) with an error
    Info(String),
    /// Fail the invocation itself (connection lost)
    Throw(String),
}

/// Client whose connections play back a shared script
///
/// Outcomes are consumed first-come first-served across all connections;
/// once the script runs dry, every invocation completes ok.
pub struct ScriptedClient {
    script: Arc<Mutex<VecDeque<Script>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    closable: bool,
}

impl ScriptedClient {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            closable: true,
        }
    }

    pub fn non_closable(script: Vec<Script>) -> Self {
        Self {
            closable: false,
            ..Self::new(script)
        }
    }
}

#[async_trait]
impl Client for ScriptedClient {
    async fn open(&self, _run: &TestRun, _node: Option<&str>) -> Result<Box<dyn ClientConn>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConn {
            script: self.script.clone(),
            closes: self.closes.clone(),
            closable: self.closable,
        }))
    }
}

struct ScriptedConn {
    script: Arc<Mutex<VecDeque<Script>>>,
    closes: Arc<AtomicUsize>,
    closable: bool,
}

#[async_trait]
impl ClientConn for ScriptedConn {
    async fn invoke(&mut self, _run: &TestRun, op: Op) -> Result<Op> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            None | Some(Script::Ok) => Ok(op.complete(OpKind::Ok)),
            Some(Script::Fail(e)) => Ok(op.complete(OpKind::Fail).with_error(e)),
            Some(Script::Info(e)) => Ok(op.complete(OpKind::Info).with_error(e)),
            Some(Script::Throw(e)) => Err(anyhow!(e)),
        }
    }

    async fn close(&mut self, _run: &TestRun) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn closable(&self) -> bool {
        self.closable
    }
}

/// Generator that records which process asked for each op
pub struct TracingGenerator {
    ops: Mutex<VecDeque<Op>>,
    nemesis_ops: Mutex<VecDeque<Op>>,
    pub seen: Arc<Mutex<Vec<Process>>>,
}

impl TracingGenerator {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops: Mutex::new(ops.into()),
            nemesis_ops: Mutex::new(VecDeque::new()),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_nemesis_ops(self, ops: Vec<Op>) -> Self {
        Self {
            nemesis_ops: Mutex::new(ops.into()),
            ..self
        }
    }

    /// Worker processes that requested ops, in request order
    pub fn worker_processes(&self) -> Vec<Process> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.is_nemesis())
            .copied()
            .collect()
    }
}

#[async_trait]
impl Generator for TracingGenerator {
    async fn next(&self, _run: &TestRun, process: Process) -> Result<Option<Op>> {
        self.seen.lock().unwrap().push(process);
        let queue = match process {
            Process::Nemesis => &self.nemesis_ops,
            Process::Worker(_) => &self.ops,
        };
        Ok(queue.lock().unwrap().pop_front())
    }
}

/// Generator that serves each worker process exactly one op
///
/// Deterministic regardless of which worker polls first, unlike a shared
/// queue where a fast worker can drain everything.
pub struct OncePerProcessGenerator {
    template: Op,
    served: Mutex<HashSet<Process>>,
}

impl OncePerProcessGenerator {
    pub fn new(template: Op) -> Self {
        Self {
            template,
            served: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Generator for OncePerProcessGenerator {
    async fn next(&self, _run: &TestRun, process: Process) -> Result<Option<Op>> {
        if process.is_nemesis() {
            return Ok(None);
        }
        if self.served.lock().unwrap().insert(process) {
            Ok(Some(self.template.clone()))
        } else {
            Ok(None)
        }
    }
}

/// OS stage that records every call
pub struct RecordingOs {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingOs {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Os for RecordingOs {
    async fn setup(&self, _run: &TestRun, node: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("os-setup:{node}"));
        Ok(())
    }

    async fn teardown(&self, _run: &TestRun, node: &str) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("os-teardown:{node}"));
        Ok(())
    }
}

/// DB stage with optional setup failure and local log files
pub struct ChaosDb {
    pub events: Arc<Mutex<Vec<String>>>,
    pub fail_setup: bool,
    pub files: HashMap<String, Vec<String>>,
}

impl ChaosDb {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            events,
            fail_setup: false,
            files: HashMap::new(),
        }
    }

    pub fn failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    pub fn with_files(mut self, files: HashMap<String, Vec<String>>) -> Self {
        self.files = files;
        self
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Db for ChaosDb {
    async fn setup(&self, _run: &TestRun, node: &str) -> Result<()> {
        self.push(format!("db-setup:{node}"));
        if self.fail_setup {
            return Err(anyhow!("db refused to start on {node}"));
        }
        Ok(())
    }

    async fn teardown(&self, _run: &TestRun, node: &str) -> Result<()> {
        self.push(format!("db-teardown:{node}"));
        Ok(())
    }

    fn log_files(&self) -> Option<&dyn LogFiles> {
        (!self.files.is_empty()).then_some(self as &dyn LogFiles)
    }
}

#[async_trait]
impl LogFiles for ChaosDb {
    async fn log_files(&self, _run: &TestRun, node: &str) -> Result<Vec<String>> {
        self.push(format!("db-logs:{node}"));
        Ok(self.files.get(node).cloned().unwrap_or_default())
    }
}

/// Checker that counts invocations and approves everything
pub struct CountingChecker {
    pub calls: Arc<AtomicUsize>,
}

impl CountingChecker {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl harness::Checker for CountingChecker {
    async fn check(
        &self,
        _run: &TestRun,
        _model: &serde_json::Value,
        _history: &[Op],
    ) -> Result<harness::CheckResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(harness::CheckResult::valid())
    }
}

/// Transport that counts session opens and closes
pub struct TrackingTransport {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl TrackingTransport {
    pub fn new() -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SessionFactory for TrackingTransport {
    async fn connect(
        &self,
        node: &str,
        ssh: &SshConfig,
    ) -> harness::SessionResult<Box<dyn NodeSession>> {
        let inner = harness::LocalTransport.connect(node, ssh).await?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackingSession {
            inner,
            closes: self.closes.clone(),
        }))
    }
}

struct TrackingSession {
    inner: Box<dyn NodeSession>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl NodeSession for TrackingSession {
    async fn exec(&self, cmd: &str) -> harness::SessionResult<String> {
        self.inner.exec(cmd).await
    }

    async fn download(
        &self,
        remote: &str,
        dest: &std::path::Path,
    ) -> harness::SessionResult<()> {
        self.inner.download(remote, dest).await
    }

    async fn close(&self) -> harness::SessionResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Assert the quantified history invariants
///
/// Every worker completion pairs with exactly one preceding invocation of
/// the same process with nothing of that process in between; indices are
/// gapless in order; nemesis records are info-typed.
pub fn assert_history_invariants(history: &[Op]) {
    for (i, op) in history.iter().enumerate() {
        if let Some(index) = op.index {
            assert_eq!(index, i as u64, "indices follow history order without gaps");
        }

        if op.process.is_nemesis() {
            assert_eq!(op.kind, OpKind::Info, "nemesis records are always info");
            continue;
        }

        if op.kind.is_completion() {
            let invocation = history[..i]
                .iter()
                .rev()
                .find(|prev| prev.process == op.process)
                .unwrap_or_else(|| panic!("completion without an invocation: {op:?}"));
            assert_eq!(
                invocation.kind,
                OpKind::Invoke,
                "the nearest earlier record of the process is its invocation"
            );
            assert!(
                invocation.completes(op),
                "completion preserves process and f: {op:?}"
            );
        }
    }

    // Per process: kinds strictly alternate invoke, completion, invoke, ...
    let mut per_process: HashMap<Process, Vec<OpKind>> = HashMap::new();
    for op in history {
        if !op.process.is_nemesis() {
            per_process.entry(op.process).or_default().push(op.kind);
        }
    }
    for (process, kinds) in per_process {
        for (i, kind) in kinds.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(*kind, OpKind::Invoke, "process {process} out of order");
            } else {
                assert!(kind.is_completion(), "process {process} out of order");
            }
        }
    }
}
