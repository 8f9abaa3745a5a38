use thiserror::Error;

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// Target system unreachable, timed out, or replied with something unusable.
    #[error("Target adapter error: {0}")]
    Adapter(String),

    /// Persona / LLM call failure while producing customer text.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Malformed structured reply from an LLM-backed policy check.
    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Report store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
