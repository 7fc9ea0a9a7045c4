use thiserror::Error;

/// Result type local to qjoin-planner.
pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// Bad input graph. Surfaced to the caller; the request fails.
    #[error("malformed join specification: {0}")]
    MalformedJoinSpec(String),

    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    /// The ALL-plans window excludes every level of a connected solution.
    /// Recovered locally by falling back to the default plan.
    #[error("enumeration window [{min}, {max}] cannot reach the full set of {relations} relations")]
    UnreachablePlan {
        min: usize,
        max: usize,
        relations: usize,
    },

    /// Recovered locally by falling back to the best plan found so far.
    #[error("optimization cancelled after {levels_completed} subset levels")]
    Cancelled { levels_completed: usize },

    #[error("request YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("explain JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] qjoin_core::error::Error),
}

impl PlannerError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        PlannerError::MalformedJoinSpec(msg.into())
    }
}
