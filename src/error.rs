use thiserror::Error;

/// Library-level errors using thiserror for structured error handling.
///
/// Per-token failures (`ParseError`) are treated as noise by the caller.
/// Per-frame failures (`ExtractorError`) empty a single frame. Only
/// configuration and file errors are fatal, and those are wrapped with
/// anyhow context at the application layer.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Chip value is empty after cleanup")]
    Empty,

    #[error("Chip value is zero")]
    Zero,

    #[error("Unparsable chip value: {0}")]
    Invalid(String),

    #[error("Chip value {value} outside plausible range")]
    OutOfRange { value: u64 },
}

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),

    #[error("Request to {endpoint} failed")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Extractor service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed extractor response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine user config directory")]
    NoConfigDir,
}

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to load rule tables from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid rule tables: {0}")]
    Invalid(String),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
