use std::path::PathBuf;

use adk_rust::AdkError;
use thiserror::Error;

/// Core error type for the historical court pipeline.
#[derive(Debug, Error)]
pub enum CourtError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("agent framework error: {0}")]
    Framework(#[from] AdkError),
    #[error("agent `{agent}` tool `{tool}` failed: {source}")]
    Tool {
        agent: String,
        tool: String,
        #[source]
        source: ToolError,
    },
    #[error("graph execution failure: {0}")]
    Graph(String),
}

impl CourtError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure raised by a tool invocation.
///
/// `InvalidArguments` and `Lookup` are soft: the tool reports them back to the
/// model as its response. `Io` aborts the session.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn io(path: PathBuf, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}
