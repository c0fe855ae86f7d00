use thiserror::Error;

/// Errors produced while issuing or parsing prefixed keys
///
/// The `Display` text of `InvalidToken` is deliberately uniform; the
/// `reason` is only meant for server-side logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid API key")]
    InvalidToken { reason: &'static str },

    #[error("failed to generate API key: {0}")]
    Generation(String),
}

impl TokenError {
    pub(crate) fn invalid(reason: &'static str) -> Self {
        TokenError::InvalidToken { reason }
    }

    /// Internal reason for a rejected token, if any
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            TokenError::InvalidToken { reason } => Some(reason),
            TokenError::Generation(_) => None,
        }
    }
}
