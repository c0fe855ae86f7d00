//! Client-side credential propagation
//!
//! Injects the metadata the server-side authenticators expect into every
//! outgoing request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::error::{AuthnError, Result};
use crate::metadata::{ACCESS_TOKEN, AUTHORIZATION, ID_TOKEN, ORG_ID};

/// Outgoing credentials, validated once at construction
///
/// ```rust
/// use grpc_authn::CredentialsInterceptor;
///
/// let interceptor = CredentialsInterceptor::id_token("eyJhbGciOiJSUzI1NiJ9.e30.sig", 1)
///     .unwrap()
///     .with_access_token("eyJhbGciOiJSUzI1NiJ9.e30.sig")
///     .unwrap();
/// // let client = FolderServiceClient::with_interceptor(channel, interceptor);
/// ```
#[derive(Clone, Debug, Default)]
pub struct CredentialsInterceptor {
    entries: Vec<(&'static str, AsciiMetadataValue)>,
}

fn ascii(value: String) -> Result<AsciiMetadataValue> {
    AsciiMetadataValue::try_from(value)
        .map_err(|_| AuthnError::Config("credential is not valid metadata".to_string()))
}

impl CredentialsInterceptor {
    /// `authorization: Bearer <token>` for API key authentication
    pub fn bearer(token: impl AsRef<str>) -> Result<Self> {
        Self::default().with(AUTHORIZATION, format!("Bearer {}", token.as_ref()))
    }

    /// `authorization: Basic <base64(user:pass)>`
    pub fn basic(username: &str, password: &str) -> Result<Self> {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Self::default().with(AUTHORIZATION, format!("Basic {encoded}"))
    }

    /// Identity token plus the organization it acts in
    pub fn id_token(token: impl Into<String>, org_id: i64) -> Result<Self> {
        Self::default()
            .with(ID_TOKEN, token.into())?
            .with(ORG_ID, org_id.to_string())
    }

    /// Add the calling service's access token
    pub fn with_access_token(self, token: impl Into<String>) -> Result<Self> {
        self.with(ACCESS_TOKEN, token.into())
    }

    fn with(mut self, key: &'static str, value: String) -> Result<Self> {
        let value = ascii(value)?;
        self.entries.retain(|(existing, _)| *existing != key);
        self.entries.push((key, value));
        Ok(self)
    }

    /// Write the credentials into `metadata`, replacing existing values
    pub fn apply(&self, metadata: &mut MetadataMap) {
        for (key, value) in &self.entries {
            metadata.insert(*key, value.clone());
        }
    }
}

impl Interceptor for CredentialsInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        self.apply(request.metadata_mut());
        Ok(request)
    }
}
