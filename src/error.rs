//! WolfTopo Error Types

use thiserror::Error;

/// Result type alias for WolfTopo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error number reported for failures that did not come from the server
pub const LOCAL_ERRNO: i32 = -1;

/// WolfTopo error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Database errors
    /// Driver failure without a server error number (closed pool, protocol, I/O)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query failed ({errno}): {errmsg}")]
    Query { errno: i32, errmsg: String },

    #[error("Malformed replication status: {0}")]
    Status(String),

    // Replication errors
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Replication did not converge: {0}")]
    NotConverged(String),

    #[error(
        "The topology change cannot be done at the moment- check its relationship, \
         replication status or replication lag"
    )]
    UnsupportedTopology,

    // Network errors
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Could not resolve {address}: {reason}")]
    Resolve { address: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric error code, as the server would report it for query failures
    pub fn errno(&self) -> i32 {
        match self {
            Error::Query { errno, .. } => *errno,
            _ => LOCAL_ERRNO,
        }
    }

    /// Check if a precondition refused the operation before anything was changed
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }
}
