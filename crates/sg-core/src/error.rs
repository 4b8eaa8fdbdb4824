//! Unified error type for streamgauge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

/// Unified error type covering all failure modes surfaced to callers.
///
/// Graceful-stop timeouts and partial artifact cleanup are recovered inside
/// the supervisor and only logged, so they have no variant here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A start was requested while a stream is already active.
    #[error("Stream is already running (pid {pid})")]
    AlreadyRunning {
        /// Process id of the active child.
        pid: u32,
    },

    /// A stop was requested while no stream is active.
    #[error("Stream is not running")]
    NotRunning,

    /// A supplied parameter was rejected.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name (e.g. "resolution").
        name: String,
        /// Human-readable reason.
        message: String,
        /// Accepted values, when the parameter is drawn from an allow-list.
        allowed: Vec<String>,
    },

    /// A required parameter was not supplied and has no default.
    #[error("Missing parameter '{0}'")]
    MissingParameter(String),

    /// The child program could not be spawned.
    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed {
        /// Program that was executed.
        program: String,
        /// Underlying OS error text.
        message: String,
    },

    /// Configuration failed to parse or validate.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::AlreadyRunning { .. } => 409,
            Error::NotRunning => 409,
            Error::InvalidParameter { .. } => 400,
            Error::MissingParameter(_) => 400,
            Error::SpawnFailed { .. } => 502,
            Error::Config(_) => 400,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AlreadyRunning { .. } => "already_running",
            Error::NotRunning => "not_running",
            Error::InvalidParameter { .. } => "invalid_parameter",
            Error::MissingParameter(_) => "missing_parameter",
            Error::SpawnFailed { .. } => "spawn_failed",
            Error::Config(_) => "config_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::InvalidParameter`].
    pub fn invalid(
        name: impl Into<String>,
        message: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
            allowed,
        }
    }

    /// Convenience constructor for [`Error::SpawnFailed`].
    pub fn spawn_failed(program: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SpawnFailed {
            program: program.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
