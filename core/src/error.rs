use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("breakpoint violation: {path} cannot hold attributions")]
    BreakpointViolation { path: String },

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown attribution: {0}")]
    UnknownAttribution(String),

    #[error("attribution {id} is not linked to {path}")]
    NotLinked { path: String, id: String },

    #[error("signal {0} is scanner input and cannot be edited")]
    ImmutableSignal(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("determinism violation: {0}")]
    DeterminismViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl CoreError {
    /// Invariant violations are rejected before mutation and only logged.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            CoreError::BreakpointViolation { .. }
                | CoreError::UnknownResource(_)
                | CoreError::UnknownAttribution(_)
                | CoreError::NotLinked { .. }
                | CoreError::ImmutableSignal(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
