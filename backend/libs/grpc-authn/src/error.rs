use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, AuthnError>;

/// Authentication failures
///
/// The `&'static str` payloads are the only text callers ever see; the
/// precise rejection reason is logged server-side and never reaches the
/// wire.
#[derive(Debug, Error)]
pub enum AuthnError {
    /// Malformed, missing or unverifiable credential
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    /// Caller was identified but may not proceed
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    /// A collaborator (credential store, identity lookup, key endpoint) failed
    #[error("authentication backend failure: {0:#}")]
    Backend(anyhow::Error),

    /// Request data that should have been well formed was not
    #[error("internal authentication error: {0:#}")]
    Internal(anyhow::Error),

    #[error("invalid authentication configuration: {0}")]
    Config(String),
}

impl AuthnError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            AuthnError::Unauthenticated(msg) => Status::new(Code::Unauthenticated, *msg),
            AuthnError::PermissionDenied(msg) => Status::new(Code::PermissionDenied, *msg),
            // Outermost context only; the cause chain stays in the logs
            AuthnError::Backend(err) => Status::new(Code::Unavailable, err.to_string()),
            AuthnError::Internal(err) => Status::new(Code::Internal, err.to_string()),
            AuthnError::Config(_) => Status::new(Code::Internal, "authentication misconfigured"),
        }
    }

    /// Metric label for this failure class
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthnError::Unauthenticated(_) => "unauthenticated",
            AuthnError::PermissionDenied(_) => "permission_denied",
            AuthnError::Backend(_) => "backend_error",
            AuthnError::Internal(_) => "internal_error",
            AuthnError::Config(_) => "config_error",
        }
    }
}

impl From<AuthnError> for Status {
    fn from(err: AuthnError) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthnError::Unauthenticated("invalid API key").to_status().code(),
            Code::Unauthenticated
        );
        assert_eq!(
            AuthnError::PermissionDenied("admin role required").to_status().code(),
            Code::PermissionDenied
        );
        assert_eq!(
            AuthnError::Config("x".into()).to_status().code(),
            Code::Internal
        );
    }

    #[test]
    fn test_backend_status_hides_cause() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused (10.0.0.3:5432)"));
        let err = err.context("looking up credential by hash").unwrap_err();

        let status = AuthnError::Backend(err).to_status();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "looking up credential by hash");
    }
}
