//! History verification
//!
//! Checkers analyse the final history against a model. The harness invokes
//! them through [`check_safely`], which turns any checker error into an
//! invalid result instead of crashing the run; a failed analysis is still a
//! finished test.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::Op;

use crate::plan::TestRun;

/// Verdict of a history analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the history satisfies the model
    pub valid: bool,
    /// What went wrong, for invalid results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Checker-specific findings
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl CheckResult {
    /// A passing verdict
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
            details: serde_json::Value::Null,
        }
    }

    /// A failing verdict
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            details: serde_json::Value::Null,
        }
    }

    /// Attach checker-specific findings
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// History verifier
#[async_trait]
pub trait Checker: Send + Sync {
    /// Analyse a history against a model
    async fn check(
        &self,
        run: &TestRun,
        model: &serde_json::Value,
        history: &[Op],
    ) -> Result<CheckResult>;
}

/// Invoke a checker, converting errors into invalid results
pub async fn check_safely(
    checker: &dyn Checker,
    run: &TestRun,
    model: &serde_json::Value,
    history: &[Op],
) -> CheckResult {
    match checker.check(run, model, history).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Checker failed");
            CheckResult::invalid(format!("{e:#}"))
        }
    }
}

/// Checker that approves every history
#[derive(Debug, Clone, Default)]
pub struct OptimisticChecker;

#[async_trait]
impl Checker for OptimisticChecker {
    async fn check(
        &self,
        _run: &TestRun,
        _model: &serde_json::Value,
        history: &[Op],
    ) -> Result<CheckResult> {
        Ok(CheckResult::valid()
            .with_details(serde_json::json!({ "op_count": history.len() })))
    }
}
