use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Audit abandoned before it settled")]
    Abandoned,

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    pub fn invalid_argument<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidArgument(e.to_string())
    }

    pub fn engine<E: std::fmt::Display>(e: E) -> Self {
        Self::EngineFailure(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Short machine-readable name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::InvalidArgument(_) => "invalid_argument",
            AuditError::InvalidState(_) => "invalid_state",
            AuditError::EngineFailure(_) => "engine_failure",
            AuditError::Abandoned => "abandoned",
            AuditError::Subscription(_) => "subscription",
            AuditError::Config(_) => "config",
            AuditError::Io(_) => "io",
            AuditError::Yaml(_) => "yaml",
            AuditError::Json(_) => "json",
            AuditError::Other(_) => "other",
        }
    }

    /// Errors that abort the API call synchronously (as opposed to settling a ticket)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AuditError::InvalidArgument(_) | AuditError::InvalidState(_)
        )
    }
}
