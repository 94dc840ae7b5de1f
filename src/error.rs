use thiserror::Error;

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while parsing JSON payloads (phone book, sealed credentials)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required environment variable is not set
    #[error("Environment variable {0} is not set")]
    EnvKey(String),

    /// Sealed credential file could not be encrypted or decrypted
    #[error("Credential sealing error: {0}")]
    Crypto(String),

    /// Server rejected the supplied username/password
    #[error("Access denied on {address}: {detail}")]
    AccessDenied { address: String, detail: String },

    /// Server rejected the client identity token
    #[error("Identity token rejected by {address}: {detail}")]
    IdentityRejected { address: String, detail: String },

    /// Session could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Subscription create/repair failure
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Outbound notification transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Coarse classification driving the per-server state machine: recoverable
/// errors go through backoff, fatal ones stop only the affected task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry after the fixed backoff interval
    Recoverable,
    /// Bad configuration; retrying cannot help
    ConfigurationFatal,
}

impl MonitorError {
    /// Classify this error for the connection state machine.
    pub fn class(&self) -> ErrorClass {
        match self {
            MonitorError::Config(_)
            | MonitorError::Yaml(_)
            | MonitorError::Json(_)
            | MonitorError::EnvKey(_)
            | MonitorError::Crypto(_) => ErrorClass::ConfigurationFatal,
            _ => ErrorClass::Recoverable,
        }
    }
}

/// Convenient alias over [`Result`](std::result::Result) using [`MonitorError`]
pub type Result<T> = std::result::Result<T, MonitorError>;
