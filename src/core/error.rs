use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("computation failed: {0}")]
    Computation(String),
    #[error("simulation cancelled")]
    Cancelled,
}

impl SimulationError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    /// The human-readable reason without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(msg) | Self::Computation(msg) => msg,
            Self::Cancelled => "simulation cancelled",
        }
    }
}
