use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("scope template {0:?} references unknown parameter {1:?}")]
    MissingParameter(String, String),

    #[error("malformed scope template {0:?}")]
    MalformedTemplate(String),

    /// The resolver's backing lookup failed
    #[error(transparent)]
    Lookup(#[from] anyhow::Error),
}
