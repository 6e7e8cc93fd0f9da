//! Error types for the harness
//!
//! Session and transfer errors are typed so that log collection can tell a
//! benign mid-copy race from a real failure. Collaborator contracts return
//! `anyhow::Result` instead; their error domains are not ours to enumerate.

use thiserror::Error;

/// Harness error types
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Failed to establish a session to a node
    #[error("Connection to {node} failed: {reason}")]
    Connect { node: String, reason: String },

    /// Remote command failed
    #[error("Remote command failed on {node}: {reason}")]
    Exec { node: String, reason: String },

    /// Transfer pipe closed mid-copy
    #[error("Transfer pipe closed: {0}")]
    PipeClosed(String),

    /// Remote file vanished, typically a rotation race
    #[error("Remote file does not exist: {0}")]
    FileMissing(String),

    /// Any other transfer failure
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Local filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Check if a transfer error is benign
    ///
    /// Pipes close when a remote process dies mid-copy, and log rotation
    /// deletes files between listing and download. Both are tolerated during
    /// log collection; anything else aborts it.
    pub fn is_benign_transfer(&self) -> bool {
        matches!(
            self,
            HarnessError::PipeClosed(_) | HarnessError::FileMissing(_)
        )
    }

    /// Create a Connect error
    pub fn connect(node: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::Connect {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Create an Exec error
    pub fn exec(node: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::Exec {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Create a PipeClosed error
    pub fn pipe_closed(details: impl Into<String>) -> Self {
        HarnessError::PipeClosed(details.into())
    }

    /// Create a FileMissing error
    pub fn file_missing(path: impl Into<String>) -> Self {
        HarnessError::FileMissing(path.into())
    }

    /// Create a Transfer error
    pub fn transfer(details: impl Into<String>) -> Self {
        HarnessError::Transfer(details.into())
    }
}

/// Convenience result type for session operations
pub type SessionResult<T> = Result<T, HarnessError>;
