use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;
use tonic::metadata::MetadataMap;
use tracing::{debug, warn};

use crate::authenticator::Authenticator;
use crate::error::{AuthnError, Result};
use crate::identity::Requester;
use crate::metadata::{self, AUTHORIZATION, BASIC_PREFIX};

/// Static username/password check for operator and service-to-service calls
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    password: String,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        // Both comparisons always run
        let user_ok = username.ct_eq(self.username.as_bytes());
        let pass_ok = password.ct_eq(self.password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn decode_basic(header: &str) -> Option<(String, Vec<u8>)> {
    let encoded = header.strip_prefix(BASIC_PREFIX)?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let split = decoded.iter().position(|&b| b == b':')?;
    let username = String::from_utf8(decoded[..split].to_vec()).ok()?;
    Some((username, decoded[split + 1..].to_vec()))
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, metadata: &mut MetadataMap) -> Result<Requester> {
        let header = metadata::single_value(metadata, AUTHORIZATION)?;

        let (username, password) = decode_basic(&header).ok_or_else(|| {
            warn!("authorization header is not valid basic credentials");
            AuthnError::Unauthenticated("malformed credentials")
        })?;

        if !self.matches(username.as_bytes(), &password) {
            warn!("basic credentials rejected");
            return Err(AuthnError::Unauthenticated("invalid credentials"));
        }

        metadata::strip(metadata, AUTHORIZATION);
        debug!(username = %username, "basic credentials accepted");

        Ok(Requester::Static { username })
    }
}
