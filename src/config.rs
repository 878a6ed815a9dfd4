//! Server configuration, read from command-line flags or the environment.

use clap::Parser;
use std::path::PathBuf;

use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "minikv",
    version,
    about = "A minimal Redis-compatible in-memory key-value server"
)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "MINIKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "MINIKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Append every SET to this file, replaying it on startup
    #[arg(long, env = "MINIKV_APPEND_LOG", value_name = "PATH")]
    pub append_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            append_log: None,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
