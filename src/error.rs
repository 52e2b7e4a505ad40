//! Rich diagnostic error types for the progression engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Expected domain outcomes (not ready,
//! already at maximum generation, devolution not due) are result values, not
//! errors, and never appear here.

use miette::Diagnostic;
use thiserror::Error;

use crate::agent::AgentId;

/// Top-level error type for the progression engine.
#[derive(Debug, Error, Diagnostic)]
pub enum ProgressionError {
    #[error("agent not found: {agent_id}")]
    #[diagnostic(
        code(gyeol::engine::agent_not_found),
        help(
            "The agent record does not exist in the store. Agents are created by the \
             account lifecycle, not by this engine; check the ID or insert the record first."
        )
    )]
    NotFound { agent_id: AgentId },

    #[error("concurrent modification of {agent_id} after {attempts} attempts")]
    #[diagnostic(
        code(gyeol::engine::concurrent_modification),
        help(
            "Another writer updated this agent between read and write on every attempt. \
             This is transient; the caller may retry the operation."
        )
    )]
    ConcurrentModification { agent_id: AgentId, attempts: u32 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl ProgressionError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(gyeol::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(gyeol::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(gyeol::store::serde),
        help(
            "Failed to serialize or deserialize an agent record. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("agent already exists: {agent_id}")]
    #[diagnostic(
        code(gyeol::store::duplicate),
        help("An agent with this ID is already stored. Use a fresh ID.")
    )]
    Duplicate { agent_id: AgentId },

    #[error("dialogue source error: {message}")]
    #[diagnostic(
        code(gyeol::store::dialogue),
        help("The conversation history collaborator failed to answer a read.")
    )]
    Dialogue { message: String },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(gyeol::config::read), help("Ensure the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file: {path}")]
    #[diagnostic(
        code(gyeol::config::write),
        help("Ensure the parent directory is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config \"{path}\": {message}")]
    #[diagnostic(
        code(gyeol::config::parse),
        help("Check the TOML syntax and the section names against EngineConfig.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(gyeol::config::invalid), help("Check the EngineConfig fields. {message}"))]
    Invalid { message: String },

    #[error("invalid keyword pattern \"{pattern}\": {message}")]
    #[diagnostic(
        code(gyeol::config::pattern),
        help("Analyzer rules use `regex` crate syntax. Escape metacharacters or fix the pattern.")
    )]
    InvalidPattern { pattern: String, message: String },
}

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for engine operations.
pub type ProgressionResult<T> = std::result::Result<T, ProgressionError>;
