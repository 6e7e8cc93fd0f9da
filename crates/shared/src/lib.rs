//! Shared library for the faultline test harness
//!
//! This crate provides common functionality used across the harness:
//! - Operation and history data model
//! - Error handling types
//! - Configuration management
//! - On-disk store for test snapshots and collected logs
//! - Logging infrastructure

pub mod config;
pub mod error;
pub mod op;
pub mod store;

// Re-export commonly used types
pub use config::{Config, SshConfig, StoreConfig};
pub use error::{Error, Result};
pub use op::{Op, OpKind, Process};
pub use store::Store;

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared=debug,harness=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
