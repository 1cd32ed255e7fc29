use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Already running")]
    AlreadyRunning,

    /// The first step of a two-step operation landed and the second did not.
    /// The engine and the mapping store disagree about `handle` until an
    /// operator reconciles them.
    #[error("Consistency window during {operation} (handle {handle}): {source}")]
    ConsistencyWindow {
        operation: &'static str,
        handle: u32,
        #[source]
        source: Box<DomainError>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DomainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_))
    }
}

impl From<&str> for DomainError {
    fn from(s: &str) -> Self {
        DomainError::InvalidInput(s.to_string())
    }
}
