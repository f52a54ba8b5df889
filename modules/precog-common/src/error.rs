use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrecogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Hydration error: {0}")]
    Hydration(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No citizen with id {0}")]
    SubjectNotFound(i64),

    #[error("Citizen {0} has no active intervention to resolve")]
    NoActiveIntervention(i64),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PrecogError {
    /// Wrap a graph-driver error. The driver type is not a dependency of this
    /// crate; callers stringify at the boundary.
    pub fn database(e: impl std::fmt::Display) -> Self {
        PrecogError::Database(e.to_string())
    }
}
