//! Configuration management using environment variables

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;

/// Harness configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Store configuration
    pub store: StoreConfig,

    /// Remote shell configuration
    pub ssh: SshConfig,
}

/// On-disk store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Root directory for test snapshots and collected logs
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: "store".to_string(),
        }
    }
}

/// Remote shell credentials
///
/// The harness never opens connections itself; these are handed to the
/// pluggable session transport when the pool connects to each node.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Remote user
    pub user: String,

    /// Remote port
    pub port: u16,

    /// Path to a private key file (optional)
    pub private_key_path: Option<String>,

    /// Password (optional; key-based auth is preferred)
    pub password: Option<String>,

    /// Whether to verify remote host keys
    pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            private_key_path: None,
            password: None,
            strict_host_key_checking: false,
        }
    }
}

impl SshConfig {
    /// Build a user@host target string for a node
    pub fn target(&self, node: &str) -> String {
        format!("{}@{}:{}", self.user, node, self.port)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Ok(Self {
            store: StoreConfig {
                root: env::var("STORE_DIR").unwrap_or_else(|_| "store".to_string()),
            },
            ssh: SshConfig {
                user: env::var("SSH_USER").unwrap_or_else(|_| "root".to_string()),
                port: env::var("SSH_PORT")
                    .unwrap_or_else(|_| "22".to_string())
                    .parse()
                    .map_err(|e| Error::config(format!("Invalid SSH_PORT: {}", e)))?,
                private_key_path: env::var("SSH_PRIVATE_KEY").ok(),
                password: env::var("SSH_PASSWORD").ok(),
                strict_host_key_checking: env::var("SSH_STRICT_HOST_KEY_CHECKING")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .map_err(|e| {
                        Error::config(format!("Invalid SSH_STRICT_HOST_KEY_CHECKING: {}", e))
                    })?,
            },
        })
    }
}
